//! Model layer: the module/command registry data and the contracts the
//! pipeline calls into.

pub mod command;
pub mod command_match;
pub mod invoker;
pub mod module;
pub mod parameter;
pub mod parser;
pub mod precondition;

pub use command::{Command, CommandBuilder};
pub use command_match::CommandMatch;
pub use invoker::{Arguments, CommandCall, Invoker, InvokerShape};
pub use module::{CommandModule, Module, ModuleActivator, ModuleBuilder, ModuleInstance};
pub use parameter::{Parameter, ParameterBuilder};
pub use parser::{ArgumentParser, ParseOutcome, ParserOverride};
pub use precondition::{
    FnParameterPrecondition, FnPrecondition, ParamPreconditionFailure, ParameterPrecondition,
    Precondition, PreconditionFailure, PreconditionResult, parameter_precondition, precondition,
};
