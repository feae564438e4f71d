use anyhow::{Result, bail};
use std::io::{self, IsTerminal};
use zeroize::Zeroizing;

/// Current PIN for unlocking.
pub const PIN_ENV: &str = "CARDVAULT_PIN";
/// Replacement PIN for `change-pin`.
pub const NEW_PIN_ENV: &str = "CARDVAULT_NEW_PIN";

pub fn read_pin() -> Result<Zeroizing<String>> {
    //  CARDVAULT_PIN=1234 cardvault list
    if let Some(pin) = from_env(PIN_ENV) {
        return Ok(pin);
    }

    //  echo 1234 | cardvault list
    if !io::stdin().is_terminal() {
        let pin = read_line()?;
        if !pin.is_empty() {
            return Ok(pin);
        }
        bail!("no PIN provided");
    }

    let pin = Zeroizing::new(rpassword::prompt_password("PIN: ")?);
    if pin.is_empty() {
        bail!("no PIN provided");
    }
    Ok(pin)
}

/// Read a PIN that is about to be set, asking twice unless it comes from `env`.
///
/// Piped input supplies the PIN and its confirmation on two lines.
pub fn read_new_pin_with_confirmation(env: &str) -> Result<Zeroizing<String>> {
    if let Some(pin) = from_env(env) {
        return Ok(pin);
    }

    let (pin1, pin2) = if io::stdin().is_terminal() {
        (
            Zeroizing::new(rpassword::prompt_password("New PIN: ")?),
            Zeroizing::new(rpassword::prompt_password("Confirm PIN: ")?),
        )
    } else {
        (read_line()?, read_line()?)
    };

    if pin1.is_empty() {
        bail!("PIN cannot be empty");
    }
    if pin1 != pin2 {
        bail!("PINs do not match");
    }
    Ok(pin1)
}

fn from_env(name: &str) -> Option<Zeroizing<String>> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .map(Zeroizing::new)
}

fn read_line() -> Result<Zeroizing<String>> {
    let mut buf = Zeroizing::new(String::new());
    io::stdin().read_line(&mut buf)?;
    while buf.ends_with('\n') || buf.ends_with('\r') {
        buf.pop();
    }
    Ok(buf)
}
