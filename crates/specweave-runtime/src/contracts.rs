//! Contract primitives
//!
//! `requires` fails immediately; `ensures` and `ensures_that` build deferred
//! checks that fail when they are run later. The interpreter exposes the
//! same primitives to bytecode as `contracts/Contracts`.

use std::fmt;
use std::panic::Location;

/// A failed contract check
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractViolation {
    /// The caller supplied input the contract does not accept
    #[error("Precondition violated in {site}")]
    Precondition {
        /// Where the precondition was stated
        site: String,
    },

    /// The body produced a result or state the contract does not allow
    #[error("Postcondition violated in {site}")]
    Postcondition {
        /// Where the postcondition was stated
        site: String,
    },
}

impl ContractViolation {
    /// Where the violated condition was stated
    pub fn site(&self) -> &str {
        match self {
            Self::Precondition { site } | Self::Postcondition { site } => site,
        }
    }

    /// True for precondition failures
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition { .. })
    }

    /// True for postcondition failures
    pub fn is_postcondition(&self) -> bool {
        matches!(self, Self::Postcondition { .. })
    }
}

#[track_caller]
fn caller_site() -> String {
    let location = Location::caller();
    format!("{}:{}", location.file(), location.line())
}

/// Fail with a precondition violation at the caller if `condition` is false
#[track_caller]
pub fn requires(condition: bool) -> Result<(), ContractViolation> {
    requires_at(condition, caller_site())
}

/// Fail with a precondition violation attributed to `site`
pub fn requires_at(condition: bool, site: impl Into<String>) -> Result<(), ContractViolation> {
    if condition {
        Ok(())
    } else {
        Err(ContractViolation::Precondition { site: site.into() })
    }
}

/// Fail with a postcondition violation attributed to `site`
pub fn ensures_at(holds: bool, site: impl Into<String>) -> Result<(), ContractViolation> {
    if holds {
        Ok(())
    } else {
        Err(ContractViolation::Postcondition { site: site.into() })
    }
}

/// Deferred check over a result of type `T`
pub struct Postcondition<T> {
    site: String,
    predicate: Box<dyn Fn(&T) -> bool + Send + Sync>,
}

impl<T> Postcondition<T> {
    /// Where the postcondition was stated
    pub fn site(&self) -> &str {
        &self.site
    }

    /// Run the check against `result`
    pub fn check(&self, result: &T) -> Result<(), ContractViolation> {
        ensures_at((self.predicate)(result), self.site.as_str())
    }
}

impl<T> fmt::Debug for Postcondition<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Postcondition").field("site", &self.site).finish()
    }
}

/// Deferred check taking no argument, for methods without a result
pub struct PostconditionRunnable {
    site: String,
    condition: Box<dyn Fn() -> bool + Send + Sync>,
}

impl PostconditionRunnable {
    /// Where the postcondition was stated
    pub fn site(&self) -> &str {
        &self.site
    }

    /// Run the check
    pub fn run(&self) -> Result<(), ContractViolation> {
        ensures_at((self.condition)(), self.site.as_str())
    }
}

impl fmt::Debug for PostconditionRunnable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostconditionRunnable")
            .field("site", &self.site)
            .finish()
    }
}

/// Build a deferred check that `predicate` holds for the result
#[track_caller]
pub fn ensures<T, F>(predicate: F) -> Postcondition<T>
where
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    Postcondition {
        site: caller_site(),
        predicate: Box::new(predicate),
    }
}

/// Build a deferred check that `condition` holds once the body has run
#[track_caller]
pub fn ensures_that<F>(condition: F) -> PostconditionRunnable
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    PostconditionRunnable {
        site: caller_site(),
        condition: Box::new(condition),
    }
}
