//! Use Cases Layer: Memory Management
//!
//! The allocator behind the NIF memory primitives. Native code allocates
//! through [`TrackedAllocator`] so the runtime can account for every byte,
//! and an optional limit makes allocation failure reproducible in tests.
//!
//! ## Modules
//!
//! - **[`allocator`](allocator/index.html)**: the [`Allocator`] trait, the
//!   tracked `malloc`-backed implementation and its statistics.
//!
//! ## See Also
//!
//! - [`infrastructure_nif_api`](../../infrastructure/infrastructure_nif_api/index.html):
//!   `enif_alloc`, `enif_realloc`, `enif_free`

pub mod allocator;

pub use allocator::{
    get_global_allocator, AllocationError, Allocator, AllocatorStats, TrackedAllocator,
};
