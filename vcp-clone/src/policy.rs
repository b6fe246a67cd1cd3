//! Policy guard: admission checks run before any stage
//!
//! Pure function of the payload. Checks run in order and stop at the first
//! violation: consent, provider, text length.

use crate::error::PolicyViolation;
use crate::models::JobPayload;

/// The only supported TTS provider
pub const SUPPORTED_PROVIDER: &str = "elevenlabs";

/// Evaluate admission policy for a job payload
pub fn evaluate(payload: &JobPayload) -> Result<(), PolicyViolation> {
    if !payload.consent_flag {
        return Err(PolicyViolation::MissingConsent);
    }

    if !payload
        .provider
        .trim()
        .eq_ignore_ascii_case(SUPPORTED_PROVIDER)
    {
        return Err(PolicyViolation::UnsupportedProvider(payload.provider.clone()));
    }

    let len = payload.text.chars().count();
    let max = payload.limits.max_text_length;
    if len > max {
        return Err(PolicyViolation::TextTooLong { len, max });
    }

    Ok(())
}
