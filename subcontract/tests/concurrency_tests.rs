//! One runtime shared by many threads

use std::sync::Arc;

use rayon::prelude::*;
use subcontract::{
    handler::FailureHandlers, ContractConfig, ContractError, ContractKind, ContractRuntime,
    ContractSpec, Invariant, OldValue,
};

#[derive(Debug)]
struct Wallet {
    coins: u32,
}

impl Invariant for Wallet {
    type Base = ();

    fn invariant(&self) -> bool {
        self.coins <= 1_000
    }
}

#[test]
fn test_independent_objects_checked_in_parallel() {
    let runtime = Arc::new(ContractRuntime::with_handlers(
        ContractConfig::default(),
        FailureHandlers::propagating(),
    ));
    let earn = ContractSpec::public_function("Wallet::earn")
        .precondition(|w: &Wallet, n: &u32| w.coins + n <= 1_000)
        .old(|w: &Wallet, _: &u32| w.coins)
        .postcondition(|w, n, old: &OldValue<u32>, _: &()| old.holds(|c| w.coins == c + n))
        .on(&runtime);

    let mut wallets: Vec<Wallet> = (0..64).map(|_| Wallet { coins: 0 }).collect();
    wallets.par_iter_mut().for_each(|wallet| {
        for _ in 0..10 {
            earn.call(wallet, 3, |w, n| {
                w.coins += *n;
                Ok::<_, ContractError>(())
            })
            .unwrap();
        }
    });

    assert!(wallets.iter().all(|w| w.coins == 30));
    let stats = runtime.stats();
    assert_eq!(stats.evaluated.precondition, 640);
    assert_eq!(stats.evaluated.postcondition, 640);
    // static and instance invariants, at entry and at exit
    assert_eq!(stats.evaluated.invariant, 640 * 4);
    assert_eq!(stats.failed.total(), 0);
    assert_eq!(stats.reentrant_skips, 0);
}

#[test]
fn test_violations_counted_across_threads() {
    let runtime = Arc::new(ContractRuntime::with_handlers(
        ContractConfig::default(),
        FailureHandlers::propagating(),
    ));
    let halve = ContractSpec::<(), u32, u32>::function("halve")
        .precondition(|_, n| n % 2 == 0)
        .on(&runtime);

    let rejected = (0u32..200)
        .into_par_iter()
        .filter(|n| halve.invoke(*n, |n| Ok::<_, ContractError>(*n / 2)).is_err())
        .count();

    assert_eq!(rejected, 100);
    let stats = runtime.stats();
    assert_eq!(stats.failed.get(ContractKind::Precondition), 100);
    assert_eq!(stats.evaluated.precondition, 200);
}

#[test]
fn test_override_binding_built_once_under_contention() {
    let runtime = Arc::new(ContractRuntime::with_handlers(
        ContractConfig::default(),
        FailureHandlers::propagating(),
    ));
    let bindings: Vec<_> = (0..32)
        .into_par_iter()
        .map(|_| {
            runtime
                .override_binding::<Wallet, u32, (), _>("earn(u32)", |b| {
                    b.declare(
                        "Wallet",
                        ContractSpec::public_function("Wallet::earn")
                            .precondition(|w: &Wallet, n: &u32| w.coins + n <= 1_000),
                    )
                })
                .unwrap()
        })
        .collect();

    assert_eq!(runtime.binding_count(), 1);
    assert!(bindings.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
}
