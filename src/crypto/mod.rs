mod pkce;
mod state_codec;
mod token_issuer;

pub use pkce::{derive_challenge, verify_challenge};
pub use state_codec::{StateCodec, StateMap};
pub use token_issuer::{DiracClaims, IdTokenIdentity, TokenIssuer};
