//! Towers Functions
//!
//! Named server functions and the pipeline that gates them:
//! - Function descriptors and the handler capability trait
//! - A registry with one-time registration
//! - Pluggable authentication and authorization hooks
//! - The dispatcher running lookup, authentication, rights check and invocation

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod dispatcher;
pub mod function;
pub mod hooks;
pub mod manifest;
pub mod registry;

pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use function::{
    handler_fn, FunctionDescriptor, FunctionHandler, FunctionRequest, FunctionResponse,
    HandlerFn, ResponseBody, UploadedFile,
};
pub use hooks::{AllowAllAuthorizer, AnonymousAuthenticator, Authenticator, Authorizer};
pub use manifest::FunctionInfo;
pub use registry::FunctionRegistry;
