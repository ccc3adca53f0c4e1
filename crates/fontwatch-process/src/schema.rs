//! Persisted state contract.
//!
//! A [`StateSchema`] is an ordered list of [`FieldDef`]s. Each field knows
//! whether it is expected given the rest of the state, how to initialize,
//! serialize and load itself, and optionally how to validate the stored
//! value before loading it. The persisted document is a flat JSON object
//! whose key set equals the expected keys; anything else is rejected on
//! load instead of being patched up.
//!
//! Expectation predicates run in declaration order against the partially
//! loaded state, so a field may depend on any field declared before it.
//!
//! ```
//! use fontwatch_process::{FieldDef, StateSchema};
//!
//! #[derive(Default)]
//! struct Review {
//!     action: Option<String>,
//!     reason: Option<String>,
//! }
//!
//! let schema = StateSchema::new()
//!     .field(FieldDef::new("action", |s: &Review| &s.action, |s| &mut s.action, || None))
//!     .field(
//!         FieldDef::new("reason", |s: &Review| &s.reason, |s| &mut s.reason, || None)
//!             .expected_when(|s| s.action.as_deref() == Some("dismiss")),
//!     );
//!
//! let mut review = Review::default();
//! schema.init(&mut review);
//! assert_eq!(schema.expected_keys(&review), vec!["action"]);
//! ```

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::StateError;

type Predicate<S> = Box<dyn Fn(&S) -> bool + Send + Sync>;
type Init<S> = Box<dyn Fn(&mut S) + Send + Sync>;
type Save<S> = Box<dyn Fn(&S) -> serde_json::Result<Value> + Send + Sync>;
type Load<S> = Box<dyn Fn(&mut S, Value) -> Result<(), String> + Send + Sync>;
type Validate<S> = Box<dyn Fn(&S, &Value) -> Result<(), String> + Send + Sync>;

/// Definition of one persisted field.
pub struct FieldDef<S> {
    name: String,
    expected: Option<Predicate<S>>,
    init: Init<S>,
    save: Save<S>,
    load: Load<S>,
    validate: Option<Validate<S>>,
}

impl<S: 'static> FieldDef<S> {
    /// A field stored through serde at the place `get`/`get_mut` point to.
    pub fn new<T, I>(name: &str, get: fn(&S) -> &T, get_mut: fn(&mut S) -> &mut T, init: I) -> Self
    where
        T: Serialize + DeserializeOwned + 'static,
        I: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            expected: None,
            init: Box::new(move |state| *get_mut(state) = init()),
            save: Box::new(move |state| serde_json::to_value(get(state))),
            load: Box::new(move |state, value| {
                *get_mut(state) = serde_json::from_value(value).map_err(|e| e.to_string())?;
                Ok(())
            }),
            validate: None,
        }
    }

    /// Only expects the field while `predicate` holds. Fields are expected
    /// unconditionally otherwise.
    pub fn expected_when(mut self, predicate: impl Fn(&S) -> bool + Send + Sync + 'static) -> Self {
        self.expected = Some(Box::new(predicate));
        self
    }

    /// Adds a check run on the stored value before it is loaded.
    pub fn validate(mut self, check: impl Fn(&S, &Value) -> Result<(), String> + Send + Sync + 'static) -> Self {
        self.validate = Some(Box::new(check));
        self
    }

    /// Moves the field into a state type `P` that contains `S`.
    pub fn lift<P: 'static>(self, project: fn(&P) -> &S, project_mut: fn(&mut P) -> &mut S) -> FieldDef<P> {
        let Self {
            name,
            expected,
            init,
            save,
            load,
            validate,
        } = self;
        FieldDef {
            name,
            expected: expected.map(|p| Box::new(move |outer: &P| p(project(outer))) as Predicate<P>),
            init: Box::new(move |outer| init(project_mut(outer))),
            save: Box::new(move |outer| save(project(outer))),
            load: Box::new(move |outer, value| load(project_mut(outer), value)),
            validate: validate.map(|v| Box::new(move |outer: &P, value: &Value| v(project(outer), value)) as Validate<P>),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn is_expected(&self, state: &S) -> bool {
        self.expected.as_ref().is_none_or(|p| p(state))
    }
}

impl<S> fmt::Debug for FieldDef<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDef")
            .field("name", &self.name)
            .field("conditional", &self.expected.is_some())
            .field("validated", &self.validate.is_some())
            .finish()
    }
}

/// Ordered set of field definitions.
pub struct StateSchema<S> {
    fields: Vec<FieldDef<S>>,
}

impl<S: 'static> Default for StateSchema<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: 'static> StateSchema<S> {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Appends a field. A later definition with the same name replaces the
    /// earlier one in place.
    pub fn field(mut self, def: FieldDef<S>) -> Self {
        match self.fields.iter_mut().find(|f| f.name == def.name) {
            Some(existing) => *existing = def,
            None => self.fields.push(def),
        }
        self
    }

    /// Appends every field of `defs`.
    pub fn fields(self, defs: impl IntoIterator<Item = FieldDef<S>>) -> Self {
        defs.into_iter().fold(self, Self::field)
    }

    /// Names of the fields expected in `state`.
    pub fn expected_keys(&self, state: &S) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.is_expected(state))
            .map(|f| f.name.as_str())
            .collect()
    }

    /// Initializes every expected field, in order.
    pub fn init(&self, state: &mut S) {
        for field in &self.fields {
            if field.is_expected(state) {
                (field.init)(state);
            }
        }
    }

    /// Serializes the expected fields, optionally only those in `filter`.
    pub fn serialize(&self, state: &S, filter: Option<&[&str]>) -> Result<Map<String, Value>, StateError> {
        let mut out = Map::new();
        for field in &self.fields {
            if !field.is_expected(state) || filter.is_some_and(|keys| !keys.contains(&field.name.as_str())) {
                continue;
            }
            let value = (field.save)(state).map_err(|e| StateError::Serialize {
                field: field.name.clone(),
                message: e.to_string(),
            })?;
            out.insert(field.name.clone(), value);
        }
        Ok(out)
    }

    /// Loads `stored` into `state`, failing with every issue found.
    pub fn load(&self, state: &mut S, stored: &Value) -> Result<(), StateError> {
        let object = stored.as_object().ok_or(StateError::NotAnObject(json_kind(stored)))?;
        let mut issues = Vec::new();
        let mut known = HashSet::new();

        for field in &self.fields {
            known.insert(field.name.as_str());
            let present = object.get(&field.name);
            match (field.is_expected(state), present) {
                (true, None) => issues.push(format!("{} expected but NOT PRESENT", field.name)),
                (false, Some(_)) => issues.push(format!("{} NOT EXPECTED but present", field.name)),
                (false, None) => {}
                (true, Some(value)) => {
                    if let Some(validate) = &field.validate
                        && let Err(message) = validate(state, value)
                    {
                        issues.push(format!("{} is invalid: {message}", field.name));
                        continue;
                    }
                    if let Err(message) = (field.load)(state, value.clone()) {
                        issues.push(format!("{} can't be loaded: {message}", field.name));
                    }
                }
            }
        }

        let mut unspecified: Vec<&str> = object.keys().map(String::as_str).filter(|k| !known.contains(k)).collect();
        if !unspecified.is_empty() {
            unspecified.sort_unstable();
            issues.push(format!("unspecified keys: {}", unspecified.join(", ")));
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(StateError::Incompatible(issues))
        }
    }
}

impl<S> fmt::Debug for StateSchema<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.fields.iter().map(|field| &field.name)).finish()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
