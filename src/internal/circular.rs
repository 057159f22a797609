//! Re-entrancy detection for runtime construction.

use std::cell::RefCell;

use crate::error::{DiError, DiResult};

const MAX_DEPTH: usize = 1024;

// Ids being constructed on the current thread, outermost first.
thread_local! {
    static CONSTRUCTION_STACK: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// Marks a service id as under construction on this thread until dropped.
pub(crate) struct ConstructionGuard {
    id: String,
}

impl ConstructionGuard {
    /// Fails with `ReentrantConstruction` when `id` is already being
    /// constructed further up this thread's stack.
    pub(crate) fn enter(id: &str) -> DiResult<Self> {
        CONSTRUCTION_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(start) = stack.iter().position(|n| n == id) {
                let mut chain = stack[start..].to_vec();
                chain.push(id.to_string());
                return Err(DiError::ReentrantConstruction { chain });
            }
            if stack.len() >= MAX_DEPTH {
                let mut chain = stack[stack.len() - 3..].to_vec();
                chain.push(id.to_string());
                return Err(DiError::ReentrantConstruction { chain });
            }
            stack.push(id.to_string());
            Ok(())
        })?;
        Ok(Self { id: id.to_string() })
    }

    /// Fails with `ReentrantConstruction` when `id` is being constructed on
    /// this thread, without entering it.
    pub(crate) fn check(id: &str) -> DiResult<()> {
        CONSTRUCTION_STACK.with(|stack| {
            let stack = stack.borrow();
            match stack.iter().position(|n| n == id) {
                Some(start) => {
                    let mut chain = stack[start..].to_vec();
                    chain.push(id.to_string());
                    Err(DiError::ReentrantConstruction { chain })
                }
                None => Ok(()),
            }
        })
    }
}

impl Drop for ConstructionGuard {
    fn drop(&mut self) {
        CONSTRUCTION_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(pos) = stack.iter().rposition(|n| *n == self.id) {
                stack.truncate(pos);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_reentry_reports_the_chain() {
        let _a = ConstructionGuard::enter("a").unwrap();
        let _b = ConstructionGuard::enter("b").unwrap();
        match ConstructionGuard::enter("a") {
            Err(DiError::ReentrantConstruction { chain }) => assert_eq!(chain, vec!["a", "b", "a"]),
            other => panic!("expected re-entrancy error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn guard_releases_on_drop() {
        {
            let _a = ConstructionGuard::enter("x").unwrap();
            assert!(ConstructionGuard::check("x").is_err());
        }
        assert!(ConstructionGuard::check("x").is_ok());
        assert!(ConstructionGuard::enter("x").is_ok());
    }
}
