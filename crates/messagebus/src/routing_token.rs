//! Delegation token creation and validation.
//!
//! The token is signed by the node that granted the delegation; the payload
//! binds it to a specific target, sender, pulse and message hash, so a token
//! cannot be replayed for a different message.

use pulsenet_core::crypto::CryptographyService;
use pulsenet_core::message::RoutingToken;
use pulsenet_core::types::{PulseNumber, RecordRef};
use pulsenet_core::CoreError;

fn token_payload(to: &RecordRef, from: &RecordRef, pulse: PulseNumber, msg_hash: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(72 + 72 + 4 + msg_hash.len());
    buf.extend_from_slice(&to.to_bytes());
    buf.extend_from_slice(&from.to_bytes());
    buf.extend_from_slice(&pulse.to_bytes());
    buf.extend_from_slice(msg_hash);
    buf
}

pub fn create_token(
    crypto: &dyn CryptographyService,
    to: RecordRef,
    from: RecordRef,
    pulse: PulseNumber,
    msg_hash: &[u8],
) -> Result<RoutingToken, CoreError> {
    let sign = crypto.sign(&token_payload(&to, &from, pulse, msg_hash))?;
    Ok(RoutingToken {
        to,
        from,
        pulse,
        sign,
    })
}

pub fn validate_token(
    crypto: &dyn CryptographyService,
    public_key: &[u8],
    token: &RoutingToken,
    msg_hash: &[u8],
) -> Result<(), CoreError> {
    let payload = token_payload(&token.to, &token.from, token.pulse, msg_hash);
    if crypto.verify(public_key, &token.sign, &payload) {
        Ok(())
    } else {
        Err(CoreError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulsenet_core::crypto::NodeCryptography;

    #[test]
    fn token_binds_to_message_hash() {
        let crypto = NodeCryptography::generate();
        let (to, from) = (RecordRef::random(), RecordRef::random());
        let token = create_token(&crypto, to, from, PulseNumber(5), b"hash-1").unwrap();

        assert!(validate_token(&crypto, &crypto.public_key(), &token, b"hash-1").is_ok());
        assert!(matches!(
            validate_token(&crypto, &crypto.public_key(), &token, b"hash-2"),
            Err(CoreError::InvalidToken)
        ));
    }

    #[test]
    fn token_rejects_foreign_signer() {
        let granter = NodeCryptography::generate();
        let other = NodeCryptography::generate();
        let token = create_token(
            &granter,
            RecordRef::random(),
            RecordRef::random(),
            PulseNumber(5),
            b"hash",
        )
        .unwrap();
        assert!(matches!(
            validate_token(&granter, &other.public_key(), &token, b"hash"),
            Err(CoreError::InvalidToken)
        ));
    }
}
