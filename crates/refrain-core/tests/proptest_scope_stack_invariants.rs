#![forbid(unsafe_code)]

//! Property-based invariant tests for the token-addressed scope stack.
//!
//! These tests verify the bookkeeping that build scopes rely on, for **any**
//! interleaving of pushes and removals:
//!
//! 1. `current()` is always the newest surviving entry.
//! 2. `remove()` deletes exactly the entry carrying the token.
//! 3. Unknown tokens are ignored.
//! 4. `len()` and `is_empty()` match a naive model after every operation.
//! 5. Removing every issued token, in any order, leaves the stack empty.

use proptest::prelude::*;
use refrain_core::scope::ScopeStack;

// ── Strategies ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Op {
    Push(u32),
    /// Remove the nth surviving entry (index taken modulo the live count).
    Remove(usize),
    RemoveUnknown,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => any::<u32>().prop_map(Op::Push),
        2 => (0usize..8).prop_map(Op::Remove),
        1 => Just(Op::RemoveUnknown),
    ]
}

fn ops_strategy() -> impl Strategy<Value = Vec<Op>> {
    proptest::collection::vec(op_strategy(), 0..60)
}

// ═════════════════════════════════════════════════════════════════════════
// 1. Stack matches a naive model under arbitrary operations
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn stack_matches_naive_model(ops in ops_strategy()) {
        let mut stack = ScopeStack::new();
        let mut model: Vec<(u64, u32)> = Vec::new();

        for op in ops {
            match op {
                Op::Push(value) => {
                    let token = stack.push(value);
                    prop_assert!(model.iter().all(|(t, _)| *t != token));
                    model.push((token, value));
                }
                Op::Remove(nth) => {
                    if model.is_empty() {
                        continue;
                    }
                    let index = nth % model.len();
                    let (token, value) = model.remove(index);
                    prop_assert_eq!(stack.remove(token), Some(value));
                }
                Op::RemoveUnknown => {
                    // Tokens start at 1 and count up; u64::MAX is never issued.
                    let before = stack.len();
                    prop_assert_eq!(stack.remove(u64::MAX), None);
                    prop_assert_eq!(stack.len(), before);
                }
            }
            prop_assert_eq!(stack.len(), model.len());
            prop_assert_eq!(stack.is_empty(), model.is_empty());
            prop_assert_eq!(stack.current().copied(), model.last().map(|(_, v)| *v));
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 2. Draining every token in any order empties the stack
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn draining_all_tokens_in_any_order_empties_the_stack(
        values in proptest::collection::vec(any::<u32>(), 1..40),
        seed in any::<u64>(),
    ) {
        let mut stack = ScopeStack::new();
        let mut tokens: Vec<u64> = values.iter().map(|v| stack.push(*v)).collect();

        // Seed-driven removal order so shrinking stays deterministic.
        let mut state = seed;
        while !tokens.is_empty() {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let index = (state % tokens.len() as u64) as usize;
            let token = tokens.swap_remove(index);
            prop_assert!(stack.remove(token).is_some());
        }

        prop_assert!(stack.is_empty());
        prop_assert!(stack.current().is_none());
    }
}
