use std::fmt;

use zeroize::Zeroizing;

/// In-memory unlock session. The password lives here only while the vault
/// is unlocked and is wiped when the session ends or is dropped; it is never
/// written to storage.
#[derive(Default)]
pub struct Session {
    password: Option<Zeroizing<String>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) the session, returning the previous password.
    pub fn start(&mut self, password: &str) -> Option<Zeroizing<String>> {
        self.password.replace(Zeroizing::new(password.to_string()))
    }

    /// Put back a password returned by [`Session::start`].
    pub fn restore(&mut self, previous: Option<Zeroizing<String>>) {
        self.password = previous;
    }

    pub fn end(&mut self) {
        self.password = None;
    }

    pub fn is_active(&self) -> bool {
        self.password.is_some()
    }

    /// Owned copy for handing to the crypto worker.
    pub fn password(&self) -> Option<Zeroizing<String>> {
        self.password.clone()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("active", &self.is_active())
            .finish()
    }
}
