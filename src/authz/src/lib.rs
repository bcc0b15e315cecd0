//! # lazyref authz
//!
//! Memoized permission decisions over deferred references.
//!
//! ## Features
//!
//! - **`Perm`**: named rules, keyed per approval, per target id, or not at all
//! - **`Approval`**: one requester's decision context, resolving each decision once
//! - **Delegation**: rules may ask other rules through the same approval
//! - **Refusals** carry a human-readable reason
//!
//! ## Example
//!
//! ```rust
//! use lazyref_authz::{Approval, Approved, Perm, Refused};
//! use lazyref_core::{id_by, Ref, Settled, TypeTag};
//!
//! #[derive(Clone)]
//! struct Course {
//!     id: i64,
//!     owner: String,
//! }
//!
//! const COURSE: TypeTag = TypeTag::new("Course");
//!
//! let edit = Perm::<String, Course>::cache_on_id(
//!     "edit course",
//!     COURSE,
//!     id_by(|c: &Course| c.id),
//!     |prior, course| {
//!         prior.who().zip(course).flat_map(|(who, course): (String, Course)| {
//!             if who == course.owner {
//!                 Approved::because("Yes, you are an author").into()
//!             } else {
//!                 Refused::new("Only the owner may edit this course").into()
//!             }
//!         })
//!     },
//! );
//!
//! let approval = Approval::new(Ref::ready("ada".to_string()));
//! let course = Course { id: 7, owner: "ada".to_string() };
//!
//! let decision = approval.ask(edit.on(Ref::ready(course)));
//! assert!(matches!(decision.fetch(), Settled::Ready(ref a) if a.reason.is_some()));
//! ```

pub mod decision;
pub mod perm;
pub mod approval;

// Re-export commonly used types
pub use decision::{Approved, Refused};
pub use perm::{Askable, Perm, PermId, PermKey, PermRequest, Target};
pub use approval::Approval;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
