use crate::error::{FairPlayError, Result};
use crate::ledger::Signer;
use crate::tx::{ActionRequest, SignedRequest};
use crate::types::Address;
use async_trait::async_trait;
use bip39::{Language, Mnemonic};
use bitcoin::key::Keypair;
use bitcoin::secp256k1::{schnorr, All, Message, Secp256k1, XOnlyPublicKey};
use bitcoin::Network;
use std::str::FromStr;

const DERIVATION_PATH: &str = "m/86'/0'/0'/0/0";

pub fn generate_mnemonic() -> Result<String> {
    let mut rng = bip39::rand::thread_rng();
    let mnemonic = Mnemonic::generate_in_with(&mut rng, Language::English, 24)
        .map_err(|e| FairPlayError::key(format!("Failed to generate mnemonic: {}", e)))?;
    Ok(mnemonic.to_string())
}

pub fn mnemonic_to_keypair(mnemonic: &str) -> Result<Keypair> {
    let mnemonic = Mnemonic::parse_in(Language::English, mnemonic)
        .map_err(|e| FairPlayError::key(format!("Invalid mnemonic: {}", e)))?;

    let seed = mnemonic.to_seed("");
    let secp = Secp256k1::new();

    let master_key = bitcoin::bip32::Xpriv::new_master(Network::Bitcoin, &seed)
        .map_err(|e| FairPlayError::key(format!("Failed to derive master key: {}", e)))?;

    let path = bitcoin::bip32::DerivationPath::from_str(DERIVATION_PATH)
        .map_err(|e| FairPlayError::key(format!("Invalid derivation path: {}", e)))?;

    let child_key = master_key
        .derive_priv(&secp, &path)
        .map_err(|e| FairPlayError::key(format!("Failed to derive child key: {}", e)))?;

    Ok(Keypair::from_secret_key(&secp, &child_key.private_key))
}

/// Ledger address of a keypair: its 32-byte x-only public key.
pub fn keypair_address(keypair: &Keypair) -> Address {
    let (xonly, _parity) = keypair.x_only_public_key();
    Address::new(xonly.serialize())
}

/// Checks a BIP-340 signature over `request.id()`.
pub fn verify_signed(signed: &SignedRequest) -> bool {
    let secp = Secp256k1::verification_only();
    let Ok(pubkey) = XOnlyPublicKey::from_slice(signed.signer.as_bytes()) else {
        return false;
    };
    let Ok(signature) = schnorr::Signature::from_slice(&signed.signature) else {
        return false;
    };
    let msg = Message::from_digest(signed.request.id());
    secp.verify_schnorr(&signature, &msg, &pubkey).is_ok()
}

/// Local signing agent backed by a secp256k1 keypair.
pub struct KeypairSigner {
    keypair: Keypair,
    address: Address,
    secp: Secp256k1<All>,
}

impl KeypairSigner {
    pub fn new(keypair: Keypair) -> Self {
        let address = keypair_address(&keypair);
        Self {
            keypair,
            address,
            secp: Secp256k1::new(),
        }
    }

    pub fn from_mnemonic(mnemonic: &str) -> Result<Self> {
        Ok(Self::new(mnemonic_to_keypair(mnemonic)?))
    }
}

impl std::fmt::Debug for KeypairSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeypairSigner")
            .field("address", &self.address)
            .finish()
    }
}

#[async_trait]
impl Signer for KeypairSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign(&self, requests: &[ActionRequest]) -> Result<Vec<SignedRequest>> {
        if let Some(foreign) = requests.iter().find(|r| r.sender != self.address) {
            return Err(FairPlayError::signing_rejected(format!(
                "request sender {} is not this key",
                foreign.sender
            )));
        }

        Ok(requests
            .iter()
            .map(|request| {
                let msg = Message::from_digest(request.id());
                let signature = self.secp.sign_schnorr_no_aux_rand(&msg, &self.keypair);
                SignedRequest {
                    request: request.clone(),
                    signer: self.address,
                    signature: signature.serialize().to_vec(),
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::{Action, TxParams};
    use crate::types::{MatchId, StorageKey};

    const MNEMONIC: &str = concat!(
        "abandon abandon abandon abandon abandon abandon ",
        "abandon abandon abandon abandon abandon about"
    );

    fn request(sender: Address) -> ActionRequest {
        ActionRequest {
            sender,
            app_id: 1,
            params: TxParams::from_last_round(1000, 20, "localnet"),
            action: Action::Join { match_id: MatchId(2) },
            boxes: vec![StorageKey::new(b"match_2".to_vec())],
            group: None,
        }
    }

    #[test]
    fn test_mnemonic_derivation_is_deterministic() {
        let a = KeypairSigner::from_mnemonic(MNEMONIC).unwrap();
        let b = KeypairSigner::from_mnemonic(MNEMONIC).unwrap();
        assert_eq!(a.address(), b.address());
        assert!(!a.address().is_zero());
    }

    #[test]
    fn test_generated_mnemonic_parses() {
        let phrase = generate_mnemonic().unwrap();
        assert_eq!(phrase.split_whitespace().count(), 24);
        assert!(mnemonic_to_keypair(&phrase).is_ok());
        assert!(mnemonic_to_keypair("not a mnemonic").is_err());
    }

    #[tokio::test]
    async fn test_signatures_verify() {
        let signer = KeypairSigner::from_mnemonic(MNEMONIC).unwrap();
        let signed = signer.sign(&[request(signer.address())]).await.unwrap();
        assert_eq!(signed.len(), 1);
        assert!(verify_signed(&signed[0]));

        let mut tampered = signed[0].clone();
        tampered.request.action = Action::Join { match_id: MatchId(3) };
        assert!(!verify_signed(&tampered));
    }

    #[tokio::test]
    async fn test_refuses_foreign_sender() {
        let signer = KeypairSigner::from_mnemonic(MNEMONIC).unwrap();
        let err = signer
            .sign(&[request(Address::new([4; 32]))])
            .await
            .unwrap_err();
        assert!(matches!(err, FairPlayError::SigningRejected(_)));
    }
}
