//! Composable execution wrappers for fallible async operations.
//!
//! Policies nest by plain function composition at the call site:
//!
//! ```ignore
//! let response = retry
//!     .run_with_result_check(
//!         || timeout.run(client.send(&request)),
//!         |resp: &HttpResponse| resp.status >= 500,
//!     )
//!     .await?;
//! ```

mod retry;
mod timeout;

pub use retry::{BackoffStrategy, RetryPolicy};
pub use timeout::TimeoutPolicy;
