//! A bounded stack with contracts on every public operation

use std::sync::Arc;

use anyhow::Result;
use subcontract::{
    handler, spec::stage, ContractConfig, ContractError, ContractRuntime, ContractSpec, Invariant,
    OldValue, Resolution,
};
use tracing::{info, warn};

struct Stack {
    items: Vec<String>,
    capacity: usize,
}

impl Invariant for Stack {
    type Base = ();

    fn class_name() -> &'static str {
        "Stack"
    }

    fn invariant(&self) -> bool {
        self.items.len() <= self.capacity
    }
}

struct Contracts {
    push: ContractSpec<'static, Stack, String, (), usize, stage::Postconditioned>,
    pop: ContractSpec<'static, Stack, (), String, Vec<String>, stage::Postconditioned>,
}

impl Contracts {
    fn new(runtime: &Arc<ContractRuntime>) -> Self {
        Self {
            push: ContractSpec::public_function("Stack::push")
                .precondition(|s: &Stack, _: &String| s.items.len() < s.capacity)
                .old(|s: &Stack, _: &String| s.items.len())
                .postcondition(|s, item, old: &OldValue<usize>, _| {
                    old.holds(|n| s.items.len() == n + 1) && s.items.last() == Some(item)
                })
                .on(runtime),
            pop: ContractSpec::public_function("Stack::pop")
                .precondition(|s: &Stack, _: &()| !s.items.is_empty())
                .old(|s: &Stack, _: &()| s.items.clone())
                .postcondition(|s, _, old: &OldValue<Vec<String>>, top: &String| {
                    old.holds(|items| items.last() == Some(top) && items[..items.len() - 1] == s.items[..])
                })
                .on(runtime),
        }
    }
}

impl Stack {
    fn push(&mut self, contracts: &Contracts, item: &str) -> Result<(), ContractError> {
        contracts.push.call(self, item.to_string(), |s, item| {
            s.items.push(std::mem::take(item));
            Ok(())
        })
    }

    fn pop(&mut self, contracts: &Contracts) -> Result<String, ContractError> {
        contracts.pop.call(self, (), |s, _| {
            s.items.pop().ok_or_else(|| ContractError::Usage("pop from empty stack".into()))
        })
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let runtime = Arc::new(ContractRuntime::new(ContractConfig::default().with_audit(true)));
    runtime.update_handlers(|h| {
        h.set_precondition_failure(|v| {
            warn!("{v}");
            Resolution::Propagate
        });
        h.set_invariant_failure(handler::propagate_unless_destructor);
    });
    let contracts = Contracts::new(&runtime);

    let mut stack = Stack { items: Vec::new(), capacity: 2 };
    stack.push(&contracts, "a")?;
    stack.push(&contracts, "b")?;

    match stack.push(&contracts, "c") {
        Ok(()) => info!("pushed past capacity"),
        Err(err) => info!("rejected: {err}"),
    }

    info!(top = %stack.pop(&contracts)?, "popped");
    info!(top = %stack.pop(&contracts)?, "popped");
    if let Err(err) = stack.pop(&contracts) {
        info!("rejected: {err}");
    }

    println!("{}", serde_json::to_string_pretty(&runtime.stats())?);
    Ok(())
}
