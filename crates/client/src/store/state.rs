//! State shapes the store engine can hold.

use serde_json::{Map, Value};

/// A state type that accepts field updates.
///
/// `apply` writes one field and reports whether it actually changed under
/// [`ShallowEq`](super::ShallowEq); the engine skips subscriber evaluation
/// when nothing did.
pub trait StoreState: Send + 'static {
    type Update: Send + 'static;

    fn apply(&mut self, update: Self::Update) -> bool;
}

/// Declares a state struct plus its field-update enum.
///
/// ```rust,ignore
/// store_state! {
///     pub struct Counter => CounterField {
///         value: u32 => Value,
///         label: String => Label,
///     }
/// }
///
/// store.dispatch(CounterField::Value(3));
/// ```
#[macro_export]
macro_rules! store_state {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident => $update:ident {
            $(
                $(#[$field_meta:meta])*
                $field:ident : $ty:ty => $variant:ident
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        $vis struct $name {
            $(
                $(#[$field_meta])*
                pub $field: $ty,
            )*
        }

        #[doc = concat!("Single-field update for [`", stringify!($name), "`].")]
        #[derive(Debug, Clone)]
        $vis enum $update {
            $( $variant($ty), )*
        }

        impl $crate::store::StoreState for $name {
            type Update = $update;

            fn apply(&mut self, update: $update) -> bool {
                match update {
                    $(
                        $update::$variant(value) => {
                            if $crate::store::ShallowEq::shallow_eq(&self.$field, &value) {
                                false
                            } else {
                                self.$field = value;
                                true
                            }
                        }
                    )*
                }
            }
        }
    };
}

/// Schemaless state keyed by field name.
///
/// Any field name is accepted, including ones that did not exist before.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DynamicState {
    fields: Map<String, Value>,
}

/// `(field, value)` pair for [`DynamicState`].
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicUpdate {
    pub field: String,
    pub value: Value,
}

impl DynamicState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON object; anything else yields an empty state.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self { fields },
            _ => Self::default(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn update(field: impl Into<String>, value: impl Into<Value>) -> DynamicUpdate {
        DynamicUpdate {
            field: field.into(),
            value: value.into(),
        }
    }
}

impl StoreState for DynamicState {
    type Update = DynamicUpdate;

    fn apply(&mut self, update: DynamicUpdate) -> bool {
        if self.fields.get(&update.field) == Some(&update.value) {
            return false;
        }
        self.fields.insert(update.field, update.value);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    crate::store_state! {
        struct Sample => SampleField {
            flag: bool => Flag,
            name: String => Name,
        }
    }

    #[test]
    fn generated_apply_reports_changes() {
        let mut state = Sample {
            flag: false,
            name: String::new(),
        };
        assert!(state.apply(SampleField::Flag(true)));
        assert!(!state.apply(SampleField::Flag(true)));
        assert!(state.apply(SampleField::Name("x".into())));
        assert_eq!(state.name, "x");
    }

    #[test]
    fn dynamic_state_accepts_unknown_fields() {
        let mut state = DynamicState::from_value(json!({"auth": false}));
        assert!(state.apply(DynamicState::update("brand_new", 5)));
        assert_eq!(state.get("brand_new"), Some(&json!(5)));
        assert!(!state.apply(DynamicState::update("auth", false)));
    }
}
