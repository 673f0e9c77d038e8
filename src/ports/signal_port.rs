//! Text-generation port used by personas.

use crate::domain::error::CryptofundError;

pub trait SignalPort {
    /// Send a prompt and return the raw reply text.
    fn complete(&self, prompt: &str) -> Result<String, CryptofundError>;
}
