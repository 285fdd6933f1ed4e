//! Natural phrase variation for appointment talk.
//!
//! A reply that always opens with the same canned sentence reads as a bot.
//! This library holds small phrase pools per situation and samples one,
//! keeping confirmations and appointment answers varied without touching
//! the LLM.

use rand::seq::SliceRandom;

const APPOINTMENT_CONFIRMATION: &[&str] = &[
    "Got it, you're locked in for {time}.",
    "Perfect! I'll make sure the car's ready for you at {time}.",
    "You're all set for {time}. Looking forward to it!",
    "Great! I'll have everything ready for your {time} appointment.",
];

const APPOINTMENT_INFO: &[&str] = &[
    "You're set for {time}.",
    "Your appointment is at {time}.",
    "You're locked in for {time}.",
    "I have you down for {time}.",
];

const LIGHT_RESPONSE: &[&str] = &[
    "Of course, happy to help!",
    "No problem at all!",
    "Glad I could help!",
    "You're welcome!",
    "Anytime!",
];

fn sample(pool: &[&str]) -> String {
    pool.choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or_default()
        .to_owned()
}

/// A varied appointment confirmation mentioning the agreed time.
pub fn appointment_confirmation(time: &str) -> String {
    sample(APPOINTMENT_CONFIRMATION).replace("{time}", time)
}

/// A varied answer to "what time is my appointment".
pub fn appointment_info(time: &str) -> String {
    sample(APPOINTMENT_INFO).replace("{time}", time)
}

/// A light acknowledgement for thanks and small talk.
pub fn light_response() -> String {
    sample(LIGHT_RESPONSE)
}
