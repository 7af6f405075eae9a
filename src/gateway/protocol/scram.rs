//! Server side of SCRAM-SHA-256 (RFC 5802 / RFC 7677), used when
//! `auth.scram_enabled` is set. The gateway never stores a long-lived
//! verifier: it knows the IRIS-side plaintext password (from the wallet or
//! static config) and derives a fresh salt per authentication attempt, so a
//! captured SCRAM transcript is useless for replay against a different salt.

use base64::{encode as b64encode, decode as b64decode};
use hmac::{Hmac, Mac, NewMac};
use pbkdf2::pbkdf2;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::gateway::common::{Error, Result};

pub const MECHANISM: &str = "SCRAM-SHA-256";
const DEFAULT_ITERATIONS: u32 = 4096;
const NONCE_BYTES: usize = 18;

type HmacSha256 = Hmac<Sha256>;

fn hmac(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

fn h(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

fn xor(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    for i in 0..32 {
        out[i] = a[i] ^ b[i];
    }
    out
}

fn salted_password(password: &str, salt: &[u8], iterations: u32) -> [u8; 32] {
    let normalized = stringprep::saslprep(password).unwrap_or_else(|_| password.into());
    let mut out = [0u8; 32];
    pbkdf2::<HmacSha256>(normalized.as_bytes(), salt, iterations, &mut out);
    out
}

fn random_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    b64encode(bytes).chars().filter(|c| *c != ',').collect()
}

fn parse_attrs(msg: &str) -> Vec<(char, &str)> {
    msg.split(',').filter_map(|kv| {
        let mut parts = kv.splitn(2, '=');
        let k = parts.next()?.chars().next()?;
        let v = parts.next()?;
        Some((k, v))
    }).collect()
}

#[derive(PartialEq, Eq)]
enum Stage {
    Initial,
    AwaitingFinal,
    Done,
}

/// A single SCRAM-SHA-256 exchange for one authentication attempt.
pub struct ScramServer {
    password: String,
    salt: [u8; 16],
    iterations: u32,
    server_nonce: String,
    client_first_bare: String,
    server_first: String,
    stage: Stage,
}

impl ScramServer {
    pub fn new(password: &str) -> Self {
        let mut salt = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt);
        Self {
            password: password.to_string(),
            salt,
            iterations: DEFAULT_ITERATIONS,
            server_nonce: String::new(),
            client_first_bare: String::new(),
            server_first: String::new(),
            stage: Stage::Initial,
        }
    }

    /// Consumes the client-first-message (the body of a PasswordMessage
    /// sent in response to AuthenticationSASL), returns the
    /// server-first-message to send back in AuthenticationSASLContinue.
    pub fn client_first(&mut self, msg: &str) -> Result<String> {
        if self.stage != Stage::Initial {
            return Err(Error::protocol_error("SCRAM client-first received out of order"));
        }
        // "n,,n=user,r=clientnonce" — gs2 header, then bare message we echo back.
        let bare = msg.splitn(3, ',').nth(2)
            .ok_or_else(|| Error::protocol_error("malformed SCRAM client-first-message"))?;
        let attrs = parse_attrs(bare);
        let client_nonce = attrs.iter().find(|(k, _)| *k == 'r').map(|(_, v)| *v)
            .ok_or_else(|| Error::protocol_error("SCRAM client-first-message missing nonce"))?;

        self.client_first_bare = bare.to_string();
        self.server_nonce = format!("{}{}", client_nonce, random_nonce());
        self.server_first = format!(
            "r={},s={},i={}",
            self.server_nonce,
            b64encode(self.salt),
            self.iterations
        );
        self.stage = Stage::AwaitingFinal;
        Ok(self.server_first.clone())
    }

    /// Consumes the client-final-message, verifies the client's proof, and
    /// returns the server-final-message (including ServerSignature) on
    /// success. Returns `ErrorKind::Auth` on a bad password.
    pub fn client_final(&mut self, msg: &str) -> Result<String> {
        if self.stage != Stage::AwaitingFinal {
            return Err(Error::protocol_error("SCRAM client-final received out of order"));
        }
        let attrs = parse_attrs(msg);
        let channel_binding = attrs.iter().find(|(k, _)| *k == 'c').map(|(_, v)| *v)
            .ok_or_else(|| Error::protocol_error("SCRAM client-final-message missing channel binding"))?;
        let nonce = attrs.iter().find(|(k, _)| *k == 'r').map(|(_, v)| *v)
            .ok_or_else(|| Error::protocol_error("SCRAM client-final-message missing nonce"))?;
        let proof_b64 = attrs.iter().find(|(k, _)| *k == 'p').map(|(_, v)| *v)
            .ok_or_else(|| Error::protocol_error("SCRAM client-final-message missing proof"))?;

        if nonce != self.server_nonce {
            return Err(Error::auth_error("SCRAM nonce mismatch"));
        }
        if channel_binding != "biws" {
            // "biws" == base64("n,,") — we don't support channel binding (no TLS termination here).
            return Err(Error::auth_error("unsupported SCRAM channel binding"));
        }

        let salted = salted_password(&self.password, &self.salt, self.iterations);
        let client_key = hmac(&salted, b"Client Key");
        let stored_key = h(&client_key);
        let client_final_without_proof = format!("c={},r={}", channel_binding, nonce);
        let auth_message = format!(
            "{},{},{}",
            self.client_first_bare, self.server_first, client_final_without_proof
        );
        let client_signature = hmac(&stored_key, auth_message.as_bytes());
        let recovered_client_key = xor(&client_signature, &{
            let proof = b64decode(proof_b64).map_err(|_| Error::auth_error("malformed SCRAM proof"))?;
            let mut arr = [0u8; 32];
            if proof.len() != 32 {
                return Err(Error::auth_error("malformed SCRAM proof length"));
            }
            arr.copy_from_slice(&proof);
            arr
        });
        let recovered_stored_key = h(&recovered_client_key);

        if recovered_stored_key.ct_eq(&stored_key).unwrap_u8() != 1 {
            return Err(Error::auth_error("password does not match"));
        }

        let server_key = hmac(&salted, b"Server Key");
        let server_signature = hmac(&server_key, auth_message.as_bytes());
        self.stage = Stage::Done;
        Ok(format!("v={}", b64encode(server_signature)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drives a full exchange the way a SCRAM client library would, to
    /// prove the server accepts the right password and rejects the wrong one.
    fn run_exchange(server_password: &str, client_password: &str) -> Result<()> {
        let client_nonce = "fyko+d2lbbFgONRv9qkxdawL";
        let client_first_bare = format!("n=user,r={}", client_nonce);
        let client_first = format!("n,,{}", client_first_bare);

        let mut server = ScramServer::new(server_password);
        let server_first = server.client_first(&client_first)?;
        let attrs = parse_attrs(&server_first);
        let combined_nonce = attrs.iter().find(|(k, _)| *k == 'r').unwrap().1;
        let salt = b64decode(attrs.iter().find(|(k, _)| *k == 's').unwrap().1).unwrap();
        let iterations: u32 = attrs.iter().find(|(k, _)| *k == 'i').unwrap().1.parse().unwrap();

        let client_final_without_proof = format!("c=biws,r={}", combined_nonce);
        let auth_message = format!("{},{},{}", client_first_bare, server_first, client_final_without_proof);

        let salted = salted_password(client_password, &salt, iterations);
        let client_key = hmac(&salted, b"Client Key");
        let stored_key = h(&client_key);
        let client_signature = hmac(&stored_key, auth_message.as_bytes());
        let client_proof = xor(&client_signature, &client_key);

        let client_final = format!("{},p={}", client_final_without_proof, b64encode(client_proof));
        server.client_final(&client_final)?;
        Ok(())
    }

    #[test]
    fn accepts_correct_password() {
        assert!(run_exchange("hunter2", "hunter2").is_ok());
    }

    #[test]
    fn rejects_wrong_password() {
        assert!(run_exchange("hunter2", "wrong-password").is_err());
    }
}
