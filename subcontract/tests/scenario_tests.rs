//! End-to-end scenarios: bounded stack, move construction, custom handlers
//! and invariant evaluation counts

use std::cell::Cell;
use std::sync::Arc;

use parking_lot::Mutex;
use subcontract::{
    handler::{self, FailureHandlers},
    spec::stage,
    ContractConfig, ContractError, ContractKind, ContractRuntime, ContractSpec, ContractViolation,
    FailureContext, Invariant, Resolution,
};

fn propagating() -> Arc<ContractRuntime> {
    Arc::new(ContractRuntime::with_handlers(ContractConfig::default(), FailureHandlers::propagating()))
}

// ===== Bounded stack =====

struct BoundedStack {
    items: Vec<i32>,
    capacity: usize,
}

impl Invariant for BoundedStack {
    type Base = ();

    fn class_name() -> &'static str {
        "BoundedStack"
    }

    fn invariant(&self) -> bool {
        self.items.len() <= self.capacity
    }
}

struct StackContracts {
    put: ContractSpec<'static, BoundedStack, i32, (), usize, stage::Postconditioned>,
    pop: ContractSpec<'static, BoundedStack, (), i32, usize, stage::Postconditioned>,
}

impl StackContracts {
    fn new(runtime: &Arc<ContractRuntime>) -> Self {
        Self {
            put: ContractSpec::public_function("BoundedStack::put")
                .precondition(|s: &BoundedStack, _: &i32| s.items.len() < s.capacity)
                .old(|s: &BoundedStack, _: &i32| s.items.len())
                .postcondition(|s, x, old, _| {
                    old.holds(|n| s.items.len() == n + 1) && s.items.last() == Some(x)
                })
                .on(runtime),
            pop: ContractSpec::public_function("BoundedStack::pop")
                .precondition(|s: &BoundedStack, _: &()| !s.items.is_empty())
                .old(|s: &BoundedStack, _: &()| s.items.len())
                .postcondition(|s, _, old, _: &i32| old.holds(|n| s.items.len() + 1 == *n))
                .on(runtime),
        }
    }
}

impl BoundedStack {
    fn put(&mut self, contracts: &StackContracts, x: i32) -> Result<(), ContractError> {
        contracts.put.call(self, x, |s, x| {
            s.items.push(*x);
            Ok(())
        })
    }

    fn pop(&mut self, contracts: &StackContracts) -> Result<i32, ContractError> {
        contracts.pop.call(self, (), |s, _| {
            s.items.pop().ok_or_else(|| ContractError::Usage("empty".into()))
        })
    }

    fn count(&self) -> usize {
        self.items.len()
    }
}

#[test]
fn test_bounded_stack_rejects_overflow() {
    let runtime = propagating();
    let contracts = StackContracts::new(&runtime);
    let mut stack = BoundedStack { items: Vec::new(), capacity: 3 };

    stack.put(&contracts, 1).unwrap();
    stack.put(&contracts, 2).unwrap();
    stack.put(&contracts, 3).unwrap();

    let err = stack.put(&contracts, 4).unwrap_err();
    let violation = err.violation().unwrap();
    assert_eq!(violation.kind(), ContractKind::Precondition);
    assert_eq!(violation.function_name(), Some("BoundedStack::put"));
    assert_eq!(stack.count(), 3);
}

#[test]
fn test_bounded_stack_pop() {
    let runtime = propagating();
    let contracts = StackContracts::new(&runtime);
    let mut stack = BoundedStack { items: vec![7], capacity: 3 };
    assert_eq!(stack.pop(&contracts).unwrap(), 7);
    let err = stack.pop(&contracts).unwrap_err();
    assert_eq!(err.violation_kind(), Some(ContractKind::Precondition));
}

// ===== Move construction =====

struct Buffer {
    data: Vec<u8>,
    moved: bool,
    runtime: Arc<ContractRuntime>,
}

impl Invariant for Buffer {
    type Base = ();

    fn class_name() -> &'static str {
        "Buffer"
    }

    fn invariant(&self) -> bool {
        self.moved || !self.data.is_empty()
    }
}

impl Buffer {
    fn new(runtime: &Arc<ContractRuntime>, data: Vec<u8>) -> Result<Self, ContractError> {
        let owner = Arc::clone(runtime);
        ContractSpec::constructor::<Buffer>("Buffer::new")
            .precondition(|_, data: &Vec<u8>| !data.is_empty())
            .on(runtime)
            .construct(data, |data| {
                Ok(Buffer { data: std::mem::take(data), moved: false, runtime: owner })
            })
    }

    /// Move-construct from `source`, leaving it in the moved-from state
    fn take_from(source: &mut Buffer) -> Result<Self, ContractError> {
        let runtime = Arc::clone(&source.runtime);
        let owner = Arc::clone(&runtime);
        ContractSpec::constructor::<Buffer>("Buffer::take_from")
            .precondition(|_, source: &&mut Buffer| !source.moved)
            .postcondition(|_, source, _, dest: &Buffer| source.moved && !dest.moved)
            .on(&runtime)
            .construct(source, |source| {
                let data = std::mem::take(&mut source.data);
                source.moved = true;
                Ok(Buffer { data, moved: false, runtime: owner })
            })
    }

    fn moved(&self) -> bool {
        self.moved
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        let runtime = Arc::clone(&self.runtime);
        let destructor = ContractSpec::<Buffer, (), ()>::destructor("Buffer::drop").on(&runtime);
        if let Err(err) = destructor.destruct(self, |buffer| buffer.data.clear()) {
            tracing::warn!("{err}");
        }
    }
}

#[test]
fn test_move_leaves_source_moved() {
    let seen: Arc<Mutex<Vec<ContractViolation>>> = Arc::default();
    let log = Arc::clone(&seen);
    let mut handlers = FailureHandlers::new();
    handlers.set_all(move |v| {
        log.lock().push(v.clone());
        Resolution::Continue
    });
    let runtime = Arc::new(ContractRuntime::with_handlers(ContractConfig::default(), handlers));

    let mut src = Buffer::new(&runtime, vec![1, 2, 3]).unwrap();
    let dest = Buffer::take_from(&mut src).unwrap();
    assert!(src.moved());
    assert!(!dest.moved());
    assert_eq!(dest.data, vec![1, 2, 3]);

    drop(src);
    drop(dest);
    assert!(seen.lock().is_empty(), "unexpected violations: {:?}", seen.lock());
}

#[test]
fn test_moving_twice_is_rejected() {
    let runtime = propagating();
    let mut src = Buffer::new(&runtime, vec![1]).unwrap();
    let _dest = Buffer::take_from(&mut src).unwrap();
    let err = Buffer::take_from(&mut src).err().unwrap();
    let violation = err.violation().unwrap();
    assert_eq!(violation.kind(), ContractKind::Precondition);
    assert_eq!(violation.context(), FailureContext::FromConstructor);
}

// ===== Custom handlers =====

#[test]
fn test_logging_postcondition_handler_lets_execution_continue() {
    let log: Arc<Mutex<Vec<String>>> = Arc::default();
    let sink = Arc::clone(&log);
    let runtime = Arc::new(ContractRuntime::new(ContractConfig::default()));
    runtime.update_handlers(move |h| {
        h.set_postcondition_failure(move |v| {
            if v.context() == FailureContext::FromDestructor {
                return Resolution::Terminate;
            }
            sink.lock().push(v.to_string());
            Resolution::Continue
        });
    });

    let abs = ContractSpec::<(), i32, i32>::function("abs")
        .postcondition(|_, _, _, r| *r >= 0)
        .on(&runtime);

    // deliberately wrong body
    let result = abs.invoke(-5, |x| Ok::<_, ContractError>(*x));
    assert_eq!(result.unwrap(), -5);

    let log = log.lock();
    assert_eq!(log.len(), 1);
    assert!(log[0].contains("Postcondition violated in function 'abs'"));
}

#[test]
fn test_destructor_violations_are_not_propagated() {
    let runtime = Arc::new(ContractRuntime::new(ContractConfig::default()));
    runtime.update_handlers(|h| {
        h.set_invariant_failure(handler::propagate_unless_destructor);
    });
    let mut src = Buffer::new(&runtime, vec![9]).unwrap();
    src.data.clear();

    let destructor = ContractSpec::<Buffer, (), ()>::destructor("Buffer::close").on(&runtime);
    assert!(destructor.destruct(&mut src, |_| {}).is_ok());

    let public = ContractSpec::<Buffer, (), ()>::public_function("Buffer::len").on(&runtime);
    let err = public.call(&mut src, (), |_, _| Ok::<_, ContractError>(())).unwrap_err();
    assert_eq!(err.violation_kind(), Some(ContractKind::Invariant));

    src.data.push(1);
}

// ===== Invariant counts =====

thread_local! {
    static INVARIANT_CALLS: Cell<usize> = const { Cell::new(0) };
}

fn invariant_calls() -> usize {
    INVARIANT_CALLS.with(Cell::get)
}

struct Tally {
    total: u64,
}

impl Invariant for Tally {
    type Base = ();

    fn invariant(&self) -> bool {
        INVARIANT_CALLS.with(|c| c.set(c.get() + 1));
        true
    }
}

#[test]
fn test_invariant_evaluated_two_n_plus_one_times() {
    let runtime = propagating();
    let new = ContractSpec::constructor::<Tally>("Tally::new").on(&runtime);
    let add = ContractSpec::<Tally, u64, ()>::public_function("Tally::add").on(&runtime);
    let rebalance = ContractSpec::<Tally, (), ()>::function("Tally::rebalance").on(&runtime);

    let before = invariant_calls();
    let mut tally = new.construct((), |_| Ok::<_, ContractError>(Tally { total: 0 })).unwrap();

    const N: u64 = 7;
    for i in 0..N {
        add.call(&mut tally, i, |t, i| {
            t.total += *i;
            Ok::<_, ContractError>(())
        })
        .unwrap();
        rebalance.call(&mut tally, (), |_, _| Ok::<_, ContractError>(())).unwrap();
    }

    assert_eq!(invariant_calls() - before, 2 * N as usize + 1);
    assert_eq!(tally.total, 21);
}
