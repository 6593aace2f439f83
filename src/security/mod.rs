//! Security primitives: passwords, tokens, TOTP and secret encryption

mod crypto;
mod password;
mod token;
pub mod totp;

pub use crypto::{mask_secret, CryptoError, SecretCipher};
pub use password::{PasswordError, PasswordManager, MIN_PASSWORD_LEN};
pub use token::{Claims, TokenError, TokenService};
pub use totp::{TwoFactorError, TwoFactorSetup};
