//! Global properties are run-wide values, such as the disease parameters, that every module may
//! read. Each property is a marker type declared with `define_global_property!` and associated
//! with the type of its value. Values are usually deserialized from a JSON file with
//! `load_parameters_from_json` and then installed with `set_global_property_value`.
use std::any::{Any, TypeId};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use log::trace;
use serde::de::DeserializeOwned;

use crate::context::Context;
use crate::define_data_plugin;
use crate::error::FacsError;
use crate::hashing::{HashMap, HashMapExt};

#[macro_export]
macro_rules! define_global_property {
    ($global_property:ident, $value:ty) => {
        #[derive(Copy, Clone)]
        pub struct $global_property;

        impl $crate::global_properties::GlobalProperty for $global_property {
            type Value = $value;
        }
    };
}
pub use define_global_property;

pub trait GlobalProperty: Any {
    type Value: Any;
}

struct GlobalPropertiesDataContainer {
    global_property_container: HashMap<TypeId, Box<dyn Any>>,
}

define_data_plugin!(
    GlobalPropertiesPlugin,
    GlobalPropertiesDataContainer,
    GlobalPropertiesDataContainer {
        global_property_container: HashMap::new(),
    }
);

pub trait ContextGlobalPropertiesExt {
    /// Sets the value of a global property, replacing any previous value.
    fn set_global_property_value<T: GlobalProperty>(&mut self, property: T, value: T::Value);

    /// Returns the current value of a global property, or `None` if it was never set.
    fn get_global_property_value<T: GlobalProperty>(&self, property: T) -> Option<&T::Value>;

    /// Returns a mutable reference to the value of a global property, or `None` if it
    /// was never set. Used by interventions that adjust parameters over time.
    fn get_global_property_value_mut<T: GlobalProperty>(
        &mut self,
        property: T,
    ) -> Option<&mut T::Value>;

    /// Deserializes a value of type `T` from the JSON file at `file_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or is not valid JSON for `T`.
    fn load_parameters_from_json<T: DeserializeOwned>(&self, file_path: &Path)
        -> Result<T, FacsError>;
}

impl ContextGlobalPropertiesExt for Context {
    fn set_global_property_value<T: GlobalProperty>(&mut self, _property: T, value: T::Value) {
        trace!("setting global property {}", std::any::type_name::<T>());
        self.get_data_container_mut(GlobalPropertiesPlugin)
            .global_property_container
            .insert(TypeId::of::<T>(), Box::new(value));
    }

    fn get_global_property_value<T: GlobalProperty>(&self, _property: T) -> Option<&T::Value> {
        self.get_data_container(GlobalPropertiesPlugin)?
            .global_property_container
            .get(&TypeId::of::<T>())?
            .downcast_ref::<T::Value>()
    }

    fn get_global_property_value_mut<T: GlobalProperty>(
        &mut self,
        _property: T,
    ) -> Option<&mut T::Value> {
        self.get_data_container_mut(GlobalPropertiesPlugin)
            .global_property_container
            .get_mut(&TypeId::of::<T>())?
            .downcast_mut::<T::Value>()
    }

    fn load_parameters_from_json<T: DeserializeOwned>(
        &self,
        file_path: &Path,
    ) -> Result<T, FacsError> {
        trace!("loading parameters from {}", file_path.display());
        let reader = BufReader::new(File::open(file_path)?);
        let parameters = serde_json::from_reader(reader)?;
        Ok(parameters)
    }
}
