//! Request admission: the multi-window rate limiter gates the
//! generation endpoints, the daily credit ledger gates chat. Both run
//! their read-check-increment sequence inside one transaction.

pub mod credits;
pub mod rate_limiter;
