pub mod binding;
pub mod counter;
pub mod dom;
pub mod error;
mod exec;
pub mod instance;
pub mod module;
pub mod store;
pub mod value;

pub use binding::{attach, initialize, start, ButtonBinding, InitOptions, Runtime};
pub use counter::{Counter, CounterApi, CounterLib};
pub use error::{LinkError, Trap};
pub use instance::{Func, Instance, TypedFunc};
pub use module::Module;
pub use store::Store;
