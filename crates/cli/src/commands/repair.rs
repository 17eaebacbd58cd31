//! `turnstile repair` — Repair malformed tool-call arguments.

use std::io::Read;
use turnstile_context::JsonRepairer;

pub fn run(text: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let raw = match text {
        Some(text) => text,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let repaired = JsonRepairer::new()
        .repair(raw.trim())
        .ok_or("Input could not be repaired into valid JSON")?;
    println!("{repaired}");
    Ok(())
}
