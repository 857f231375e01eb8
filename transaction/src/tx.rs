//! The transaction value object.

use {
    crate::{
        error::{Result, TxError},
        signer::TxSignature,
        types::{BasicType, CodeFormat, FeeDelegation, FeeMode, FeeRatio, TxType},
    },
    ranger_account_key::{AccountKey, RoleType},
    ranger_primitives::{encode_canonical, keccak256, Address, Hash},
    serde::{Deserialize, Serialize},
    std::{collections::HashMap, fmt, sync::OnceLock},
};

/// Type-specific transaction content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxBody {
    /// `to == None` deploys `data` as contract code.
    Legacy {
        to: Option<Address>,
        amount: u128,
        data: Vec<u8>,
    },
    ValueTransfer {
        to: Address,
        amount: u128,
    },
    ValueTransferMemo {
        to: Address,
        amount: u128,
        memo: Vec<u8>,
    },
    AccountCreation {
        to: Address,
        amount: u128,
        key: AccountKey,
    },
    AccountUpdate {
        key: AccountKey,
    },
    /// `to == None` derives the contract address from sender and nonce.
    SmartContractDeploy {
        to: Option<Address>,
        amount: u128,
        code: Vec<u8>,
        code_format: u8,
    },
    SmartContractExecution {
        to: Address,
        amount: u128,
        data: Vec<u8>,
    },
    Cancel,
    ChainDataAnchoring {
        anchored_data: Vec<u8>,
    },
}

impl TxBody {
    pub fn basic_type(&self) -> BasicType {
        match self {
            TxBody::Legacy { .. } => BasicType::Legacy,
            TxBody::ValueTransfer { .. } => BasicType::ValueTransfer,
            TxBody::ValueTransferMemo { .. } => BasicType::ValueTransferMemo,
            TxBody::AccountCreation { .. } => BasicType::AccountCreation,
            TxBody::AccountUpdate { .. } => BasicType::AccountUpdate,
            TxBody::SmartContractDeploy { .. } => BasicType::SmartContractDeploy,
            TxBody::SmartContractExecution { .. } => BasicType::SmartContractExecution,
            TxBody::Cancel => BasicType::Cancel,
            TxBody::ChainDataAnchoring { .. } => BasicType::ChainDataAnchoring,
        }
    }
}

/// Everything a transaction carries except its signatures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxData {
    pub nonce: u64,
    pub gas_price: u64,
    pub gas_limit: u64,
    /// `None` only for legacy transactions, whose sender is recovered.
    pub from: Option<Address>,
    pub body: TxBody,
    pub fee_delegation: FeeDelegation,
}

impl TxData {
    fn tx_type(&self) -> Result<TxType> {
        let tx_type = TxType::from_parts(self.body.basic_type(), self.fee_delegation.mode())?;
        match (tx_type.is_legacy(), self.from.is_some()) {
            (true, true) => Err(TxError::TxTypeNotSupported(
                "legacy transaction with explicit sender".to_string(),
            )),
            (false, false) => Err(TxError::ValueKeyMissing(TxValueKey::From)),
            _ => Ok(tx_type),
        }
    }
}

#[derive(Deserialize)]
struct RawTransaction {
    data: TxData,
    signatures: Vec<TxSignature>,
    fee_payer_signatures: Vec<TxSignature>,
}

impl TryFrom<RawTransaction> for Transaction {
    type Error = TxError;

    fn try_from(raw: RawTransaction) -> Result<Self> {
        let mut tx = Transaction::new(raw.data)?;
        tx.signatures = raw.signatures;
        tx.fee_payer_signatures = raw.fee_payer_signatures;
        Ok(tx)
    }
}

/// A typed, possibly signed transaction.
///
/// The hash and encoded size are computed lazily and cached; changing
/// signatures through [`crate::Signer`] resets them.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "RawTransaction")]
pub struct Transaction {
    data: TxData,
    signatures: Vec<TxSignature>,
    fee_payer_signatures: Vec<TxSignature>,
    #[serde(skip)]
    tx_type: TxType,
    #[serde(skip)]
    hash: OnceLock<Hash>,
    #[serde(skip)]
    size: OnceLock<usize>,
}

#[derive(Serialize)]
struct SenderSigPayload<'a> {
    tx_type: u8,
    nonce: u64,
    gas_price: u64,
    gas_limit: u64,
    from: &'a Option<Address>,
    body: &'a TxBody,
    fee_ratio: Option<u8>,
    chain_id: u64,
}

impl Transaction {
    /// Build an unsigned transaction, rejecting type combinations that
    /// have no type code.
    pub fn new(data: TxData) -> Result<Self> {
        let tx_type = data.tx_type()?;
        Ok(Self {
            data,
            signatures: Vec::new(),
            fee_payer_signatures: Vec::new(),
            tx_type,
            hash: OnceLock::new(),
            size: OnceLock::new(),
        })
    }

    /// Build a transaction of `tx_type` from a typed field map.
    pub fn from_map(tx_type: TxType, values: &HashMap<TxValueKey, TxValue>) -> Result<Self> {
        let fields = Fields(values);
        let body = match tx_type.basic() {
            BasicType::Legacy => TxBody::Legacy {
                to: fields.opt_address(TxValueKey::To)?,
                amount: fields.u128(TxValueKey::Amount)?,
                data: fields.bytes(TxValueKey::Data)?,
            },
            BasicType::ValueTransfer => TxBody::ValueTransfer {
                to: fields.address(TxValueKey::To)?,
                amount: fields.u128(TxValueKey::Amount)?,
            },
            BasicType::ValueTransferMemo => TxBody::ValueTransferMemo {
                to: fields.address(TxValueKey::To)?,
                amount: fields.u128(TxValueKey::Amount)?,
                memo: fields.bytes(TxValueKey::Data)?,
            },
            BasicType::AccountCreation => TxBody::AccountCreation {
                to: fields.address(TxValueKey::To)?,
                amount: fields.u128(TxValueKey::Amount)?,
                key: fields.account_key(TxValueKey::AccountKey)?,
            },
            BasicType::AccountUpdate => TxBody::AccountUpdate {
                key: fields.account_key(TxValueKey::AccountKey)?,
            },
            BasicType::SmartContractDeploy => TxBody::SmartContractDeploy {
                to: fields.opt_address(TxValueKey::To)?,
                amount: fields.u128(TxValueKey::Amount)?,
                code: fields.bytes(TxValueKey::Data)?,
                code_format: fields.code_format(TxValueKey::CodeFormat)?,
            },
            BasicType::SmartContractExecution => TxBody::SmartContractExecution {
                to: fields.address(TxValueKey::To)?,
                amount: fields.u128(TxValueKey::Amount)?,
                data: fields.bytes(TxValueKey::Data)?,
            },
            BasicType::Cancel => TxBody::Cancel,
            BasicType::ChainDataAnchoring => TxBody::ChainDataAnchoring {
                anchored_data: fields.bytes(TxValueKey::AnchoredData)?,
            },
        };
        let fee_delegation = match tx_type.fee_mode() {
            FeeMode::Sender => FeeDelegation::None,
            FeeMode::Delegated => FeeDelegation::Delegated {
                fee_payer: fields.address(TxValueKey::FeePayer)?,
            },
            FeeMode::DelegatedWithRatio => FeeDelegation::WithRatio {
                fee_payer: fields.address(TxValueKey::FeePayer)?,
                ratio: FeeRatio::new(fields.fee_ratio(TxValueKey::FeeRatioOfFeePayer)?)?,
            },
        };
        let from = if tx_type.is_legacy() {
            None
        } else {
            Some(fields.address(TxValueKey::From)?)
        };
        Transaction::new(TxData {
            nonce: fields.u64(TxValueKey::Nonce)?,
            gas_price: fields.u64(TxValueKey::GasPrice)?,
            gas_limit: fields.u64(TxValueKey::GasLimit)?,
            from,
            body,
            fee_delegation,
        })
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    pub fn encode(&self) -> Vec<u8> {
        encode_canonical(self)
    }

    pub fn hash(&self) -> Hash {
        *self.hash.get_or_init(|| keccak256(&self.encode()))
    }

    /// Encoded size in bytes.
    pub fn size(&self) -> usize {
        *self.size.get_or_init(|| self.encode().len())
    }

    pub fn tx_type(&self) -> TxType {
        self.tx_type
    }

    pub fn data(&self) -> &TxData {
        &self.data
    }

    pub fn body(&self) -> &TxBody {
        &self.data.body
    }

    pub fn nonce(&self) -> u64 {
        self.data.nonce
    }

    pub fn gas_price(&self) -> u64 {
        self.data.gas_price
    }

    pub fn gas_limit(&self) -> u64 {
        self.data.gas_limit
    }

    /// Declared sender. `None` for legacy transactions; use
    /// [`crate::Signer::sender`] to get the sender of any transaction.
    pub fn from(&self) -> Option<Address> {
        self.data.from
    }

    pub fn to(&self) -> Option<Address> {
        match &self.data.body {
            TxBody::Legacy { to, .. } | TxBody::SmartContractDeploy { to, .. } => *to,
            TxBody::ValueTransfer { to, .. }
            | TxBody::ValueTransferMemo { to, .. }
            | TxBody::AccountCreation { to, .. }
            | TxBody::SmartContractExecution { to, .. } => Some(*to),
            TxBody::AccountUpdate { .. } | TxBody::Cancel | TxBody::ChainDataAnchoring { .. } => {
                None
            }
        }
    }

    pub fn value(&self) -> u128 {
        match &self.data.body {
            TxBody::Legacy { amount, .. }
            | TxBody::ValueTransfer { amount, .. }
            | TxBody::ValueTransferMemo { amount, .. }
            | TxBody::AccountCreation { amount, .. }
            | TxBody::SmartContractDeploy { amount, .. }
            | TxBody::SmartContractExecution { amount, .. } => *amount,
            TxBody::AccountUpdate { .. } | TxBody::Cancel | TxBody::ChainDataAnchoring { .. } => 0,
        }
    }

    /// Bytes charged per-byte intrinsic gas.
    pub fn payload(&self) -> &[u8] {
        match &self.data.body {
            TxBody::Legacy { data, .. } | TxBody::SmartContractExecution { data, .. } => data,
            TxBody::ValueTransferMemo { memo, .. } => memo,
            TxBody::SmartContractDeploy { code, .. } => code,
            TxBody::ChainDataAnchoring { anchored_data } => anchored_data,
            TxBody::ValueTransfer { .. }
            | TxBody::AccountCreation { .. }
            | TxBody::AccountUpdate { .. }
            | TxBody::Cancel => &[],
        }
    }

    pub fn fee_delegation(&self) -> &FeeDelegation {
        &self.data.fee_delegation
    }

    pub fn fee_payer(&self) -> Option<Address> {
        self.data.fee_delegation.fee_payer()
    }

    /// Role the sender's signatures are checked against.
    pub fn sender_role(&self) -> RoleType {
        match self.data.body {
            TxBody::AccountUpdate { .. } => RoleType::AccountUpdate,
            _ => RoleType::Transaction,
        }
    }

    /// Whether the transaction creates contract code.
    pub fn is_contract_creation(&self) -> bool {
        matches!(
            self.data.body,
            TxBody::Legacy { to: None, .. } | TxBody::SmartContractDeploy { .. }
        )
    }

    /// `gas_limit * gas_price`, the most gas this transaction can buy.
    pub fn fee(&self) -> u128 {
        u128::from(self.data.gas_limit).saturating_mul(u128::from(self.data.gas_price))
    }

    pub fn signatures(&self) -> &[TxSignature] {
        &self.signatures
    }

    pub fn fee_payer_signatures(&self) -> &[TxSignature] {
        &self.fee_payer_signatures
    }

    pub(crate) fn set_signatures(&mut self, signatures: Vec<TxSignature>) {
        self.signatures = signatures;
        self.reset_caches();
    }

    pub(crate) fn set_fee_payer_signatures(&mut self, signatures: Vec<TxSignature>) {
        self.fee_payer_signatures = signatures;
        self.reset_caches();
    }

    fn reset_caches(&mut self) {
        self.hash = OnceLock::new();
        self.size = OnceLock::new();
    }

    fn sender_payload(&self, chain_id: u64) -> SenderSigPayload<'_> {
        SenderSigPayload {
            tx_type: u8::from(self.tx_type),
            nonce: self.data.nonce,
            gas_price: self.data.gas_price,
            gas_limit: self.data.gas_limit,
            from: &self.data.from,
            body: &self.data.body,
            fee_ratio: self.data.fee_delegation.ratio().map(FeeRatio::get),
            chain_id,
        }
    }

    /// Digest signed by the sender. It does not cover the fee payer.
    pub fn sender_sig_hash(&self, chain_id: u64) -> Hash {
        keccak256(&encode_canonical(&self.sender_payload(chain_id)))
    }

    /// Digest signed by the fee payer, covering the fee payer address.
    pub fn fee_payer_sig_hash(&self, chain_id: u64) -> Hash {
        keccak256(&encode_canonical(&(
            self.sender_payload(chain_id),
            self.data.fee_delegation.fee_payer(),
        )))
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
            && self.signatures == other.signatures
            && self.fee_payer_signatures == other.fee_payer_signatures
    }
}

impl Eq for Transaction {}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("hash", &self.hash())
            .field("type", &self.tx_type)
            .field("data", &self.data)
            .field("signatures", &self.signatures.len())
            .field("fee_payer_signatures", &self.fee_payer_signatures.len())
            .finish()
    }
}

/// Keys of the typed field map accepted by [`Transaction::from_map`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxValueKey {
    Nonce,
    From,
    To,
    Amount,
    GasLimit,
    GasPrice,
    Data,
    AccountKey,
    CodeFormat,
    FeePayer,
    FeeRatioOfFeePayer,
    AnchoredData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxValue {
    Uint64(u64),
    Uint128(u128),
    Address(Address),
    Bytes(Vec<u8>),
    AccountKey(AccountKey),
    CodeFormat(CodeFormat),
    /// A raw fee ratio, range-checked on construction.
    FeeRatio(u8),
}

struct Fields<'a>(&'a HashMap<TxValueKey, TxValue>);

impl Fields<'_> {
    fn get(&self, key: TxValueKey) -> Result<&TxValue> {
        self.0.get(&key).ok_or(TxError::ValueKeyMissing(key))
    }

    fn u64(&self, key: TxValueKey) -> Result<u64> {
        match self.get(key)? {
            TxValue::Uint64(v) => Ok(*v),
            _ => Err(TxError::ValueKeyTypeMismatch(key)),
        }
    }

    fn u128(&self, key: TxValueKey) -> Result<u128> {
        match self.get(key)? {
            TxValue::Uint128(v) => Ok(*v),
            TxValue::Uint64(v) => Ok(u128::from(*v)),
            _ => Err(TxError::ValueKeyTypeMismatch(key)),
        }
    }

    fn address(&self, key: TxValueKey) -> Result<Address> {
        match self.get(key)? {
            TxValue::Address(a) => Ok(*a),
            _ => Err(TxError::ValueKeyTypeMismatch(key)),
        }
    }

    fn opt_address(&self, key: TxValueKey) -> Result<Option<Address>> {
        match self.0.get(&key) {
            None => Ok(None),
            Some(TxValue::Address(a)) => Ok(Some(*a)),
            Some(_) => Err(TxError::ValueKeyTypeMismatch(key)),
        }
    }

    fn bytes(&self, key: TxValueKey) -> Result<Vec<u8>> {
        match self.get(key)? {
            TxValue::Bytes(b) => Ok(b.clone()),
            _ => Err(TxError::ValueKeyTypeMismatch(key)),
        }
    }

    fn account_key(&self, key: TxValueKey) -> Result<AccountKey> {
        match self.get(key)? {
            TxValue::AccountKey(k) => Ok(k.clone()),
            _ => Err(TxError::ValueKeyTypeMismatch(key)),
        }
    }

    fn code_format(&self, key: TxValueKey) -> Result<u8> {
        match self.get(key)? {
            TxValue::CodeFormat(f) => Ok(u8::from(*f)),
            _ => Err(TxError::ValueKeyTypeMismatch(key)),
        }
    }

    fn fee_ratio(&self, key: TxValueKey) -> Result<u8> {
        match self.get(key)? {
            TxValue::FeeRatio(r) => Ok(*r),
            _ => Err(TxError::ValueKeyTypeMismatch(key)),
        }
    }
}
