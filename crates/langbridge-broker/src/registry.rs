use std::collections::HashMap;

use langbridge_common::protocol::error::{BridgeError, Result};
use langbridge_common::protocol::{ClassDescriptor, EndpointId};

/// A class together with the endpoint that registered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredClass {
    pub owner: EndpointId,
    pub descriptor: ClassDescriptor,
}

/// Owner and class of a live object handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectBinding {
    pub owner: EndpointId,
    pub class_name: String,
}

/// Session-wide class and object tables.
///
/// Class names and object handles are unique across the whole session,
/// whichever endpoint registered or created them. The registry itself is
/// not synchronized; the broker keeps it behind its state lock.
#[derive(Debug, Default)]
pub struct Registry {
    classes: HashMap<String, RegisteredClass>,
    objects: HashMap<String, ObjectBinding>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a class owned by `owner`.
    ///
    /// A second registration under the same name is rejected and the first
    /// descriptor stays authoritative.
    pub fn register_class(&mut self, owner: EndpointId, descriptor: ClassDescriptor) -> Result<()> {
        if self.classes.contains_key(&descriptor.name) {
            return Err(BridgeError::DuplicateClass(descriptor.name));
        }
        self.classes
            .insert(descriptor.name.clone(), RegisteredClass { owner, descriptor });
        Ok(())
    }

    /// Endpoint that owns `class_name`.
    pub fn resolve_owner(&self, class_name: &str) -> Result<EndpointId> {
        self.class(class_name).map(|class| class.owner)
    }

    pub fn class(&self, class_name: &str) -> Result<&RegisteredClass> {
        self.classes
            .get(class_name)
            .ok_or_else(|| BridgeError::UnknownClass(class_name.to_string()))
    }

    /// Binds a new object handle to its owner and class.
    pub fn bind_object(
        &mut self,
        var_name: impl Into<String>,
        owner: EndpointId,
        class_name: impl Into<String>,
    ) -> Result<()> {
        let var_name = var_name.into();
        if self.objects.contains_key(&var_name) {
            return Err(BridgeError::DuplicateHandle(var_name));
        }
        self.objects.insert(
            var_name,
            ObjectBinding {
                owner,
                class_name: class_name.into(),
            },
        );
        Ok(())
    }

    pub fn is_bound(&self, var_name: &str) -> bool {
        self.objects.contains_key(var_name)
    }

    pub fn resolve_object(&self, var_name: &str) -> Result<&ObjectBinding> {
        self.objects
            .get(var_name)
            .ok_or_else(|| BridgeError::UnknownHandle(var_name.to_string()))
    }

    /// Drops every class and object owned by a departed endpoint.
    ///
    /// Later lookups of those names fail with `UnknownClass` /
    /// `UnknownHandle`. Returns the number of classes and objects removed.
    pub fn remove_endpoint(&mut self, endpoint: EndpointId) -> (usize, usize) {
        let classes_before = self.classes.len();
        let objects_before = self.objects.len();
        self.classes.retain(|_, class| class.owner != endpoint);
        self.objects.retain(|_, object| object.owner != endpoint);
        (
            classes_before - self.classes.len(),
            objects_before - self.objects.len(),
        )
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }
}
