//! `turnstile new-id` — Print synthesized tool-call ids.

use turnstile_context::ToolCallIdGenerator;

pub fn run(count: usize) -> Result<(), Box<dyn std::error::Error>> {
    let mut ids = ToolCallIdGenerator::new();
    for _ in 0..count {
        println!("{}", ids.next_id());
    }
    Ok(())
}
