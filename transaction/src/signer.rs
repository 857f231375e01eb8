//! Chain-bound transaction signing and sender recovery.

use {
    crate::{
        error::{Result, TxError},
        tx::Transaction,
    },
    ranger_account_key::{crypto, PublicKey, RecoverableSignature, SecretKey, MAX_NUM_KEYS_FOR_MULTI_SIG},
    ranger_primitives::{Address, Hash},
    serde::{Deserialize, Serialize},
};

const V_OFFSET: u64 = 35;

/// One secp256k1 signature with its chain-bound recovery value
/// `v = recovery_id + 2 * chain_id + 35`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSignature {
    pub v: u64,
    pub r: [u8; 32],
    pub s: [u8; 32],
}

impl TxSignature {
    fn new(sig: RecoverableSignature, chain_id: u64) -> Self {
        Self {
            v: u64::from(sig.recovery_id)
                .saturating_add(chain_id.saturating_mul(2))
                .saturating_add(V_OFFSET),
            r: sig.r,
            s: sig.s,
        }
    }

    /// The chain id encoded in `v`, if `v` is well formed.
    pub fn chain_id(&self) -> Option<u64> {
        self.v.checked_sub(V_OFFSET).map(|x| x / 2)
    }

    fn to_recoverable(self, chain_id: u64) -> Result<RecoverableSignature> {
        let base = chain_id
            .checked_mul(2)
            .and_then(|x| x.checked_add(V_OFFSET))
            .ok_or(TxError::InvalidChainId)?;
        match self.v.checked_sub(base) {
            Some(id @ (0 | 1)) => Ok(RecoverableSignature {
                r: self.r,
                s: self.s,
                recovery_id: id as u8,
            }),
            _ => Err(TxError::InvalidChainId),
        }
    }
}

/// Signs and recovers transactions for one chain id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signer {
    chain_id: u64,
}

impl Signer {
    pub fn new(chain_id: u64) -> Self {
        Self { chain_id }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Replace the sender signatures with one signature per key.
    pub fn sign(&self, tx: &mut Transaction, keys: &[&SecretKey]) {
        let hash = tx.sender_sig_hash(self.chain_id);
        tx.set_signatures(self.sign_all(&hash, keys));
    }

    /// Replace the fee payer signatures with one signature per key.
    pub fn sign_fee_payer(&self, tx: &mut Transaction, keys: &[&SecretKey]) {
        let hash = tx.fee_payer_sig_hash(self.chain_id);
        tx.set_fee_payer_signatures(self.sign_all(&hash, keys));
    }

    fn sign_all(&self, hash: &Hash, keys: &[&SecretKey]) -> Vec<TxSignature> {
        keys.iter()
            .map(|key| TxSignature::new(key.sign_hash(hash), self.chain_id))
            .collect()
    }

    /// Public keys recovered from the sender signatures.
    pub fn sender_public_keys(&self, tx: &Transaction) -> Result<Vec<PublicKey>> {
        let hash = tx.sender_sig_hash(self.chain_id);
        self.recover_all(&hash, tx.signatures(), TxError::InvalidSigSender)
    }

    /// Public keys recovered from the fee payer signatures.
    pub fn fee_payer_public_keys(&self, tx: &Transaction) -> Result<Vec<PublicKey>> {
        if tx.fee_payer().is_none() {
            return Err(TxError::InvalidFeePayer);
        }
        let hash = tx.fee_payer_sig_hash(self.chain_id);
        self.recover_all(&hash, tx.fee_payer_signatures(), TxError::InvalidSigFeePayer)
    }

    fn recover_all(
        &self,
        hash: &Hash,
        signatures: &[TxSignature],
        invalid: TxError,
    ) -> Result<Vec<PublicKey>> {
        if signatures.is_empty() {
            return Err(invalid);
        }
        if signatures.len() > MAX_NUM_KEYS_FOR_MULTI_SIG {
            return Err(TxError::MaxKeysExceed);
        }
        signatures
            .iter()
            .map(|sig| {
                let sig = sig.to_recoverable(self.chain_id)?;
                crypto::recover(hash, &sig).map_err(|_| invalid.clone())
            })
            .collect()
    }

    /// The sender: declared for typed transactions, recovered for legacy.
    pub fn sender(&self, tx: &Transaction) -> Result<Address> {
        if let Some(from) = tx.from() {
            return Ok(from);
        }
        match self.sender_public_keys(tx)?.as_slice() {
            [key] => Ok(key.to_address()),
            _ => Err(TxError::InvalidSigSender),
        }
    }
}
