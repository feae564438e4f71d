use std::fmt;

use zeroize::Zeroizing;

use crate::error::{Result, VaultError};

/// Number of digits in a vault PIN.
pub const PIN_LEN: usize = 4;

/// A PIN that passed the format check. The text is zeroized on drop.
pub struct Pin(Zeroizing<String>);

impl Pin {
    pub fn parse(input: &str) -> Result<Self> {
        if input.len() != PIN_LEN || !input.bytes().all(|b| b.is_ascii_digit()) {
            return Err(VaultError::InvalidCredentialFormat);
        }
        Ok(Self(Zeroizing::new(input.to_owned())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Pin(****)")
    }
}
