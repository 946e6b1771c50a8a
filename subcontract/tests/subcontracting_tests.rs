//! Subcontracting across override chains

use std::sync::Arc;

use subcontract::{
    handler::FailureHandlers, ContractConfig, ContractError, ContractKind, ContractRuntime,
    ContractSpec, Invariant, OldValue, OverrideBinding,
};

fn runtime() -> ContractRuntime {
    ContractRuntime::with_handlers(ContractConfig::default(), FailureHandlers::propagating())
}

// An abstract account: declares the contract of `withdraw` but no body.
struct Account {
    balance: i64,
}

// Overdraft accounts accept withdrawals up to a limit below zero.
struct Overdraft {
    account: Account,
    limit: i64,
}

impl Invariant for Account {
    type Base = ();

    fn class_name() -> &'static str {
        "Account"
    }
}

impl Invariant for Overdraft {
    type Base = Account;

    fn class_name() -> &'static str {
        "Overdraft"
    }

    fn invariant(&self) -> bool {
        self.account.balance >= -self.limit
    }

    fn base(&self) -> Option<&Account> {
        Some(&self.account)
    }
}

fn account_of(o: &Overdraft) -> &Account {
    &o.account
}

fn withdraw_binding(runtime: &ContractRuntime) -> Arc<OverrideBinding<Overdraft, i64, i64>> {
    runtime
        .override_binding::<Overdraft, i64, i64, _>("withdraw(i64)", |b| {
            b.inherit(
                "Account",
                account_of,
                ContractSpec::public_function("Account::withdraw")
                    .precondition(|a: &Account, amount: &i64| *amount > 0 && *amount <= a.balance)
                    .old(|a: &Account, _: &i64| a.balance)
                    .postcondition(|a: &Account, amount: &i64, old: &OldValue<i64>, r: &i64| {
                        old.holds(|b| a.balance == b - amount) && *r == a.balance
                    }),
            )
            .declare(
                "Overdraft",
                ContractSpec::public_function("Overdraft::withdraw")
                    .precondition(|o: &Overdraft, amount: &i64| {
                        *amount > 0 && *amount <= o.account.balance + o.limit
                    })
                    .postcondition(|o: &Overdraft, _: &i64, _: &OldValue<()>, r: &i64| {
                        *r >= -o.limit
                    }),
            )
        })
        .unwrap()
}

fn withdraw(o: &mut Overdraft, amount: &mut i64) -> Result<i64, ContractError> {
    o.account.balance -= *amount;
    Ok(o.account.balance)
}

#[test]
fn test_derived_precondition_alone_suffices() {
    let runtime = runtime();
    let binding = withdraw_binding(&runtime);
    let mut acct = Overdraft { account: Account { balance: 10 }, limit: 50 };

    // Satisfies the overdraft precondition but not the base one
    assert_eq!(binding.call(&runtime, &mut acct, 40, withdraw).unwrap(), -30);
}

#[test]
fn test_precondition_violated_when_no_level_accepts() {
    let runtime = runtime();
    let binding = withdraw_binding(&runtime);
    let mut acct = Overdraft { account: Account { balance: 10 }, limit: 50 };

    let err = binding.call(&runtime, &mut acct, 100, withdraw).unwrap_err();
    assert_eq!(err.violation_kind(), Some(ContractKind::Precondition));
    assert_eq!(acct.account.balance, 10);
}

#[test]
fn test_base_postcondition_still_binds_override() {
    let runtime = runtime();
    let binding = withdraw_binding(&runtime);
    let mut acct = Overdraft { account: Account { balance: 10 }, limit: 50 };

    // Result satisfies the overdraft postcondition but charges a fee the
    // base contract does not allow
    let err = binding
        .call(&runtime, &mut acct, 5, |o, amount| {
            o.account.balance -= *amount + 1;
            Ok::<_, ContractError>(o.account.balance)
        })
        .unwrap_err();
    let violation = err.violation().unwrap();
    assert_eq!(violation.kind(), ContractKind::Postcondition);
    assert_eq!(violation.class(), Some("Account"));
}

#[test]
fn test_only_results_satisfying_every_level_succeed() {
    let runtime = runtime();
    let binding = withdraw_binding(&runtime);
    let mut acct = Overdraft { account: Account { balance: 10 }, limit: 50 };
    assert_eq!(binding.call(&runtime, &mut acct, 5, withdraw).unwrap(), 5);
    assert_eq!(runtime.stats().evaluated.postcondition, 2);
    assert_eq!(runtime.stats().failed.total(), 0);
}

#[test]
fn test_abstract_base_level_participates() {
    let runtime = runtime();
    let binding = withdraw_binding(&runtime);
    assert_eq!(binding.classes(), vec!["Account", "Overdraft"]);
    assert_eq!(binding.depth(), 2);
}

#[test]
fn test_overloads_do_not_compose() {
    let runtime = runtime();
    let by_amount = withdraw_binding(&runtime);
    let everything = runtime
        .override_binding::<Overdraft, (), i64, _>("withdraw()", |b| {
            b.declare(
                "Overdraft",
                ContractSpec::public_function("Overdraft::withdraw_all")
                    .precondition(|o: &Overdraft, _: &()| o.account.balance > 0),
            )
        })
        .unwrap();
    assert_eq!(runtime.binding_count(), 2);
    assert_eq!(everything.depth(), 1);

    // The positive-amount precondition of the other overload does not apply
    let mut acct = Overdraft { account: Account { balance: 10 }, limit: 50 };
    let drained = everything
        .call(&runtime, &mut acct, (), |o, _| {
            let amount = o.account.balance;
            o.account.balance = 0;
            Ok::<_, ContractError>(amount)
        })
        .unwrap();
    assert_eq!(drained, 10);
    assert!(by_amount.call(&runtime, &mut acct, 0, withdraw).is_err());
}

#[test]
fn test_same_signature_on_other_subject_is_separate() {
    let runtime = runtime();
    let _derived = withdraw_binding(&runtime);
    let base_only = runtime
        .override_binding::<Account, i64, i64, _>("withdraw(i64)", |b| {
            b.declare(
                "Account",
                ContractSpec::public_function("Account::withdraw")
                    .precondition(|a: &Account, amount: &i64| *amount <= a.balance),
            )
        })
        .unwrap();
    assert_eq!(base_only.depth(), 1);
    assert_eq!(runtime.binding_count(), 2);
}
