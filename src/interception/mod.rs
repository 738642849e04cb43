pub mod context;
pub mod registry;
pub mod traits;

pub use context::{
    CommandEvent, ConnectionEvent, InterceptionContext, ResultValue, Stopwatch, TaskStatus,
    TransactionEvent,
};
pub use registry::{InterceptionRegistry, InterceptorId};
pub use traits::Interceptor;
