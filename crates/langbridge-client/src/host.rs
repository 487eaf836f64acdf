//! Endpoint-side execution of broker instructions.
//!
//! The broker tells an endpoint to construct objects of the classes it
//! registered and to invoke methods on them. How that happens is up to the
//! endpoint; [`ObjectHost`] is the interface the client drives, and
//! [`ObjectTable`] is a ready-made host built from per-class factories.

use std::collections::HashMap;

use langbridge_common::protocol::error::{BridgeError, Result};
use langbridge_common::protocol::{Argument, ReturnValue};

/// Executes construct and call instructions for one endpoint.
///
/// Arguments arrive tagged with the parameter tags of the overload the
/// broker selected, so an implementation can dispatch on them.
pub trait ObjectHost: Send + 'static {
    /// Creates object `var_name` of class `class_name`.
    fn construct(&mut self, class_name: &str, var_name: &str, arguments: &[Argument]) -> Result<()>;

    /// Runs `method` on object `var_name`.
    ///
    /// Void methods return [`ReturnValue::void`].
    fn invoke(&mut self, var_name: &str, method: &str, arguments: &[Argument]) -> Result<ReturnValue>;
}

/// A live object owned by an [`ObjectTable`].
pub trait HostObject: Send {
    fn call(&mut self, method: &str, arguments: &[Argument]) -> Result<ReturnValue>;
}

type Factory = Box<dyn Fn(&[Argument]) -> Result<Box<dyn HostObject>> + Send>;

/// Table-driven [`ObjectHost`]: one factory per class, one entry per live object.
///
/// # Example
///
/// ```
/// use langbridge_client::{HostObject, ObjectHost, ObjectTable};
/// use langbridge_common::protocol::{Argument, BridgeError, ReturnValue};
///
/// struct Counter(i64);
///
/// impl HostObject for Counter {
///     fn call(&mut self, method: &str, args: &[Argument]) -> Result<ReturnValue, BridgeError> {
///         match method {
///             "add" => {
///                 self.0 += args[0].parse::<i64>()?;
///                 Ok(ReturnValue::from(self.0))
///             }
///             other => Err(BridgeError::Invocation(format!("no method {}", other))),
///         }
///     }
/// }
///
/// let mut table = ObjectTable::new();
/// table.register_factory("Counter", |_args| Ok(Box::new(Counter(0))));
///
/// table.construct("Counter", "c", &[]).unwrap();
/// let value = table.invoke("c", "add", &[Argument::from(5)]).unwrap();
/// assert_eq!(value.parse::<i64>().unwrap(), 5);
/// ```
#[derive(Default)]
pub struct ObjectTable {
    factories: HashMap<String, Factory>,
    objects: HashMap<String, Box<dyn HostObject>>,
}

impl ObjectTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers how to build objects of `class_name`.
    pub fn register_factory<F>(&mut self, class_name: impl Into<String>, factory: F)
    where
        F: Fn(&[Argument]) -> Result<Box<dyn HostObject>> + Send + 'static,
    {
        self.factories.insert(class_name.into(), Box::new(factory));
    }

    pub fn contains(&self, var_name: &str) -> bool {
        self.objects.contains_key(var_name)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl ObjectHost for ObjectTable {
    fn construct(&mut self, class_name: &str, var_name: &str, arguments: &[Argument]) -> Result<()> {
        if self.objects.contains_key(var_name) {
            return Err(BridgeError::DuplicateHandle(var_name.to_string()));
        }
        let factory = self
            .factories
            .get(class_name)
            .ok_or_else(|| BridgeError::UnknownClass(class_name.to_string()))?;
        let object = factory(arguments)?;
        self.objects.insert(var_name.to_string(), object);
        Ok(())
    }

    fn invoke(&mut self, var_name: &str, method: &str, arguments: &[Argument]) -> Result<ReturnValue> {
        self.objects
            .get_mut(var_name)
            .ok_or_else(|| BridgeError::UnknownHandle(var_name.to_string()))?
            .call(method, arguments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use langbridge_common::protocol::TypeTag;

    struct Greeter {
        greeting: String,
    }

    impl HostObject for Greeter {
        fn call(&mut self, method: &str, arguments: &[Argument]) -> Result<ReturnValue> {
            match method {
                "greet" => Ok(ReturnValue::from(format!("{}, {}", self.greeting, arguments[0].value))),
                "silence" => Ok(ReturnValue::void()),
                other => Err(BridgeError::Invocation(format!("no method '{}'", other))),
            }
        }
    }

    fn table() -> ObjectTable {
        let mut table = ObjectTable::new();
        table.register_factory("Greeter", |args| {
            let greeting = args
                .first()
                .map(|a| a.value.clone())
                .unwrap_or_else(|| "Hello".to_string());
            Ok(Box::new(Greeter { greeting }))
        });
        table
    }

    #[test]
    fn test_construct_and_invoke() {
        let mut table = table();
        table
            .construct("Greeter", "g", &[Argument::from("Hi")])
            .unwrap();

        let value = table.invoke("g", "greet", &[Argument::from("Bob")]).unwrap();
        assert_eq!(value, ReturnValue::new("Hi, Bob", TypeTag::String));
        assert!(table.contains("g"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_unknown_class() {
        let mut table = table();
        assert!(matches!(
            table.construct("Robot", "r", &[]),
            Err(BridgeError::UnknownClass(_))
        ));
        assert!(table.is_empty());
    }

    #[test]
    fn test_duplicate_handle() {
        let mut table = table();
        table.construct("Greeter", "g", &[]).unwrap();
        assert!(matches!(
            table.construct("Greeter", "g", &[]),
            Err(BridgeError::DuplicateHandle(_))
        ));
    }

    #[test]
    fn test_unknown_handle() {
        let mut table = table();
        assert!(matches!(
            table.invoke("nobody", "greet", &[]),
            Err(BridgeError::UnknownHandle(_))
        ));
    }

    #[test]
    fn test_object_errors_pass_through() {
        let mut table = table();
        table.construct("Greeter", "g", &[]).unwrap();
        assert!(matches!(
            table.invoke("g", "dance", &[]),
            Err(BridgeError::Invocation(_))
        ));
    }

    #[test]
    fn test_void_method() {
        let mut table = table();
        table.construct("Greeter", "g", &[]).unwrap();
        assert!(table.invoke("g", "silence", &[]).unwrap().is_void());
    }
}
