//! Consumer-side runtime for relay RPC.
//!
//! A call travels through the invocation pipeline owned by a
//! [`proxy::ServiceProxy`]:
//!
//! 1. **Filters** ([`filter`]) run in ascending order; a filter may answer
//!    the call locally (cache hit, mock) and short-circuit everything below.
//! 2. **Circuit breaker** ([`breaker`]) fast-fails while the target service
//!    is considered down.
//! 3. **Routers** ([`router`]) narrow the candidate instance list, e.g. gray
//!    release routing.
//! 4. **Load balancing** ([`load_balancer`]) picks one instance.
//! 5. **Transport** ([`transport`]) performs the network call, wrapped in the
//!    retry loop configured by [`retry::RetryPolicy`].
//!
//! Instance lists come from a `relay_registry::Registry` and are replaced
//! wholesale by subscription callbacks; the pipeline snapshots the list per
//! attempt. [`bootstrap::ConsumerBootstrap`] is the composition root that
//! wires all of this together.

pub mod bootstrap;
pub mod breaker;
pub mod filter;
pub mod load_balancer;
pub mod proxy;
pub mod retry;
pub mod router;
pub mod transport;

pub use bootstrap::ConsumerBootstrap;
pub use breaker::{BreakerState, CircuitBreaker};
pub use filter::{CacheFilter, Filter, FilterChain, MockFilter};
pub use load_balancer::{LoadBalancer, RandomLoadBalancer, RoundRobinLoadBalancer};
pub use proxy::{MethodDescriptor, ServiceProxy};
pub use retry::RetryPolicy;
pub use router::{GrayRouter, Router};
pub use transport::{HttpTransport, TcpTransport, Transport};
