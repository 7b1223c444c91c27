pub mod session;

use secrecy::SecretString;

#[derive(Debug)]
pub enum Action {
    Register {
        name: String,
        email: String,
        password: SecretString,
    },
    Login {
        email: String,
        password: SecretString,
    },
    Logout,
    Whoami,
}
