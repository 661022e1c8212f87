use anyhow::{bail, Result};

/// Environment variable holding the current vault password
pub const PASSWORD_ENV: &str = "FUSION_VAULT_PASSWORD";

/// Environment variable holding the new password for `set-password`
pub const NEW_PASSWORD_ENV: &str = "FUSION_VAULT_NEW_PASSWORD";

/// Password to unlock with: the environment override, else a prompt.
pub fn unlock_password() -> Result<String> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(password);
    }
    Ok(rpassword::prompt_password("Vault password: ")?)
}

/// New vault password, confirmed twice when prompted.
pub fn new_password() -> Result<String> {
    if let Ok(password) = std::env::var(NEW_PASSWORD_ENV) {
        if password.is_empty() {
            bail!("{} is set but empty", NEW_PASSWORD_ENV);
        }
        return Ok(password);
    }

    let password = rpassword::prompt_password("New vault password: ")?;
    if password.is_empty() {
        bail!("Password cannot be empty");
    }
    let confirm = rpassword::prompt_password("Confirm password: ")?;
    if password != confirm {
        bail!("Passwords don't match");
    }
    Ok(password)
}
