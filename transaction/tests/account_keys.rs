use {
    assert_matches::assert_matches,
    ranger_account_key::{AccountKey, SecretKey, WeightedMultiSig, WeightedPublicKey},
    ranger_primitives::Address,
    ranger_transaction::{
        apply_transaction, validate_for_pool, FeeDelegation, FeeRatio, MemoryState, NoopExecutor,
        Receipt, ReceiptStatus, Signer, StateReader, Transaction, TxBody, TxData, TxError,
        ValidationConfig,
    },
    test_case::test_case,
};

const CHAIN_ID: u64 = 2019;
const GAS_LIMIT: u64 = 500_000;

fn config() -> ValidationConfig {
    ValidationConfig {
        unit_price: 1,
        ..ValidationConfig::default()
    }
}

fn key(seed: &str) -> SecretKey {
    SecretKey::from_seed(seed.as_bytes())
}

fn public(seed: &str) -> AccountKey {
    AccountKey::Public(key(seed).public_key())
}

fn tx(from: Address, nonce: u64, body: TxBody, fee_delegation: FeeDelegation) -> Transaction {
    Transaction::new(TxData {
        nonce,
        gas_price: 1,
        gas_limit: GAS_LIMIT,
        from: Some(from),
        body,
        fee_delegation,
    })
    .unwrap()
}

fn apply(state: &mut MemoryState, tx: &Transaction) -> Result<Receipt, TxError> {
    apply_transaction(&config(), &Signer::new(CHAIN_ID), state, &NoopExecutor, tx)
}

fn funded() -> (SecretKey, MemoryState) {
    let alice = key("alice");
    let state = MemoryState::new().with_balance(alice.address(), 10_000_000);
    (alice, state)
}

/// Create an account at a fresh address with `account_key` and return the
/// receipt status.
fn create_with(account_key: AccountKey) -> ReceiptStatus {
    let (alice, mut state) = funded();
    let mut create = tx(
        alice.address(),
        0,
        TxBody::AccountCreation {
            to: Address::new([0xaa; 20]),
            amount: 1,
            key: account_key,
        },
        FeeDelegation::None,
    );
    Signer::new(CHAIN_ID).sign(&mut create, &[&alice]);
    apply(&mut state, &create).unwrap().status
}

/// Replace alice's key with `account_key` and return the receipt status.
fn update_with(account_key: AccountKey) -> ReceiptStatus {
    let (alice, mut state) = funded();
    let mut update = tx(
        alice.address(),
        0,
        TxBody::AccountUpdate { key: account_key },
        FeeDelegation::None,
    );
    Signer::new(CHAIN_ID).sign(&mut update, &[&alice]);
    apply(&mut state, &update).unwrap().status
}

fn weighted(threshold: u32, keys: &[(u32, &str)]) -> AccountKey {
    AccountKey::WeightedMultiSig(WeightedMultiSig::new(
        threshold,
        keys.iter()
            .map(|(w, s)| WeightedPublicKey::new(*w, key(s).public_key()))
            .collect(),
    ))
}

#[test_case(weighted(4, &[(1, "a"), (2, "b")]), ReceiptStatus::ErrUnsatisfiableThreshold; "threshold above sum")]
#[test_case(weighted(1, &[(u32::MAX, "a"), (1, "b")]), ReceiptStatus::ErrWeightedSumOverflow; "weight overflow")]
#[test_case(weighted(2, &[(1, "a"), (1, "a")]), ReceiptStatus::ErrDuplicatedKey; "same key twice")]
#[test_case(AccountKey::RoleBased(vec![]), ReceiptStatus::ErrZeroLength; "no slots")]
#[test_case(AccountKey::RoleBased(vec![public("a"), public("b"), public("c"), public("d")]), ReceiptStatus::ErrLengthTooLong; "four slots")]
#[test_case(AccountKey::RoleBased(vec![public("a")]), ReceiptStatus::Successful; "one slot")]
#[test_case(AccountKey::RoleBased(vec![public("a"), public("b")]), ReceiptStatus::Successful; "two slots")]
#[test_case(AccountKey::RoleBased(vec![public("a"), public("b"), public("c")]), ReceiptStatus::Successful; "three slots")]
#[test_case(weighted(3, &[(1, "a"), (2, "b")]), ReceiptStatus::Successful; "satisfiable threshold")]
fn test_key_installation_status(account_key: AccountKey, expected: ReceiptStatus) {
    assert_eq!(create_with(account_key.clone()), expected);
    assert_eq!(update_with(account_key), expected);
}

#[test_case(0; "transaction slot")]
#[test_case(1; "account update slot")]
#[test_case(2; "fee payer slot")]
fn test_nested_role_based_key_fails(slot: usize) {
    let mut slots = vec![public("a"), public("b"), public("c")];
    slots[slot] = AccountKey::RoleBased(vec![public("d")]);
    let nested = AccountKey::RoleBased(slots);
    assert_eq!(create_with(nested.clone()), ReceiptStatus::ErrNestedRoleBasedKey);
    assert_eq!(update_with(nested), ReceiptStatus::ErrNestedRoleBasedKey);
}

#[test]
fn test_failed_key_installation_keeps_old_key_and_charges_gas() {
    let (alice, mut state) = funded();
    let mut update = tx(
        alice.address(),
        0,
        TxBody::AccountUpdate {
            key: weighted(9, &[(1, "a")]),
        },
        FeeDelegation::None,
    );
    Signer::new(CHAIN_ID).sign(&mut update, &[&alice]);
    let receipt = apply(&mut state, &update).unwrap();
    assert_eq!(receipt.status, ReceiptStatus::ErrUnsatisfiableThreshold);
    assert_eq!(state.account_key(&alice.address()), AccountKey::Legacy);
    assert_eq!(
        state.balance(&alice.address()),
        10_000_000 - u128::from(receipt.gas_used)
    );
}

#[test]
fn test_role_gated_account_update() {
    let (alice, mut state) = funded();
    let signer = Signer::new(CHAIN_ID);
    let account = Address::new([0xbb; 20]);
    let (k1, k2, k3) = (key("k1"), key("k2"), key("k3"));

    let mut create = tx(
        alice.address(),
        0,
        TxBody::AccountCreation {
            to: account,
            amount: 1_000_000,
            key: AccountKey::RoleBased(vec![
                AccountKey::Public(k1.public_key()),
                AccountKey::Public(k2.public_key()),
                AccountKey::Public(k3.public_key()),
            ]),
        },
        FeeDelegation::None,
    );
    signer.sign(&mut create, &[&alice]);
    assert_eq!(apply(&mut state, &create).unwrap().status, ReceiptStatus::Successful);

    let update = tx(
        account,
        0,
        TxBody::AccountUpdate {
            key: public("new"),
        },
        FeeDelegation::None,
    );
    for wrong in [&k1, &k3] {
        let mut attempt = update.clone();
        signer.sign(&mut attempt, &[wrong]);
        assert_matches!(
            validate_for_pool(&config(), &signer, &state, &attempt),
            Err(TxError::InvalidSigSender)
        );
        assert_matches!(apply(&mut state, &attempt), Err(TxError::InvalidSigSender));
    }

    let mut attempt = update;
    signer.sign(&mut attempt, &[&k2]);
    assert_eq!(apply(&mut state, &attempt).unwrap().status, ReceiptStatus::Successful);
    assert_eq!(state.account_key(&account), public("new"));
}

#[test]
fn test_fee_delegated_with_ratio_exact_balances_succeed() {
    let alice = key("alice");
    let payer = key("payer");
    let signer = Signer::new(CHAIN_ID);
    let amount = 500u128;
    let fee = u128::from(GAS_LIMIT);
    let payer_part = fee * 40 / 100;
    let sender_part = fee - payer_part;

    let mut state = MemoryState::new()
        .with_balance(alice.address(), amount + sender_part)
        .with_balance(payer.address(), payer_part);
    let mut transfer = tx(
        alice.address(),
        0,
        TxBody::ValueTransfer {
            to: Address::new([3; 20]),
            amount,
        },
        FeeDelegation::WithRatio {
            fee_payer: payer.address(),
            ratio: FeeRatio::new(40).unwrap(),
        },
    );
    signer.sign(&mut transfer, &[&alice]);
    signer.sign_fee_payer(&mut transfer, &[&payer]);

    assert!(validate_for_pool(&config(), &signer, &state, &transfer).is_ok());
    let receipt = apply(&mut state, &transfer).unwrap();
    assert_eq!(receipt.status, ReceiptStatus::Successful);
    assert_eq!(receipt.gas_used, 36_000);
    assert_eq!(state.balance(&Address::new([3; 20])), amount);
}
