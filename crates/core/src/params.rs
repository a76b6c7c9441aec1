//! Parameter descriptors and immutable parameter snapshots.
//!
//! A [`ParameterSnapshot`] pairs the shared [`DescriptorSet`] of a session with the
//! current value of each parameter that is set. Unset parameters are absent from the
//! value map, which is different from any explicit value (including `null`).
//!
//! ### Refinement
//!
//! Snapshot `s2` refines `s1` when every parameter set in `s1` is also set in `s2`
//! and `refiner(s2_value, s1_value)` holds. The core does not check that refiners
//! are reflexive and transitive; callers supplying custom refiners must guarantee
//! both, otherwise the session cache may serve items a narrower query would reject.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::Error;

/// Renders a parameter value for the outgoing query.
pub type Encoder = Arc<dyn Fn(&Value) -> String + Send + Sync>;

/// Reads the comparable value of a parameter from an item.
pub type Accessor<T> = Arc<dyn Fn(&T) -> Value + Send + Sync>;

/// `(comparable item value, parameter value) -> bool`.
pub type Matcher = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;

/// `(new parameter value, old parameter value) -> bool`.
pub type Refiner = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;

/// How one named parameter is encoded, read from items, matched and refined.
pub struct ParamDescriptor<T> {
    name: String,
    encoder: Encoder,
    accessor: Accessor<T>,
    matcher: Matcher,
    refiner: Option<Refiner>,
}

impl<T: Serialize + 'static> ParamDescriptor<T> {
    /// Descriptor with the default accessor: the field called `name` on the item's
    /// JSON form (`null` when missing).
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let field = name.clone();
        Self::with_accessor(name, move |item: &T| {
            serde_json::to_value(item)
                .ok()
                .and_then(|v| v.get(&field).cloned())
                .unwrap_or(Value::Null)
        })
    }
}

impl<T> ParamDescriptor<T> {
    /// Descriptor reading the comparable value with a custom accessor.
    pub fn with_accessor(name: impl Into<String>, accessor: impl Fn(&T) -> Value + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            encoder: Arc::new(default_encode),
            accessor: Arc::new(accessor),
            matcher: Arc::new(|item: &Value, param: &Value| item == param),
            refiner: None,
        }
    }

    pub fn encoder(mut self, encoder: impl Fn(&Value) -> String + Send + Sync + 'static) -> Self {
        self.encoder = Arc::new(encoder);
        self
    }

    pub fn accessor(mut self, accessor: impl Fn(&T) -> Value + Send + Sync + 'static) -> Self {
        self.accessor = Arc::new(accessor);
        self
    }

    pub fn matcher(mut self, matcher: impl Fn(&Value, &Value) -> bool + Send + Sync + 'static) -> Self {
        self.matcher = Arc::new(matcher);
        self
    }

    /// Refinement predicate, called as `refiner(new, old)`. Defaults to the matcher.
    ///
    /// Must be reflexive and transitive.
    pub fn refiner(mut self, refiner: impl Fn(&Value, &Value) -> bool + Send + Sync + 'static) -> Self {
        self.refiner = Some(Arc::new(refiner));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn refines(&self, new: &Value, old: &Value) -> bool {
        match &self.refiner {
            Some(refiner) => refiner(new, old),
            None => (self.matcher)(new, old),
        }
    }
}

impl<T> fmt::Debug for ParamDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamDescriptor")
            .field("name", &self.name)
            .field("custom_refiner", &self.refiner.is_some())
            .finish_non_exhaustive()
    }
}

/// Strings are sent verbatim, everything else as compact JSON.
fn default_encode(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The descriptors of one session, keyed by parameter name.
#[derive(Debug)]
pub struct DescriptorSet<T> {
    descriptors: BTreeMap<String, ParamDescriptor<T>>,
}

impl<T> DescriptorSet<T> {
    /// Build a set; a later descriptor replaces an earlier one with the same name.
    pub fn new(descriptors: impl IntoIterator<Item = ParamDescriptor<T>>) -> Self {
        let descriptors = descriptors.into_iter().map(|d| (d.name.clone(), d)).collect();
        Self { descriptors }
    }

    pub fn get(&self, name: &str) -> Result<&ParamDescriptor<T>, Error> {
        self.descriptors.get(name).ok_or_else(|| Error::unknown_param(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.descriptors.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.descriptors.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    fn iter(&self) -> impl Iterator<Item = &ParamDescriptor<T>> {
        self.descriptors.values()
    }
}

/// Immutable parameter values under a shared descriptor set.
pub struct ParameterSnapshot<T> {
    descriptors: Arc<DescriptorSet<T>>,
    values: BTreeMap<String, Value>,
}

impl<T> Clone for ParameterSnapshot<T> {
    fn clone(&self) -> Self {
        Self { descriptors: Arc::clone(&self.descriptors), values: self.values.clone() }
    }
}

impl<T> ParameterSnapshot<T> {
    /// Snapshot with no parameter set.
    pub fn empty(descriptors: Arc<DescriptorSet<T>>) -> Self {
        Self { descriptors, values: BTreeMap::new() }
    }

    pub fn descriptors(&self) -> &Arc<DescriptorSet<T>> {
        &self.descriptors
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Value of `name`, or `not_set` when the parameter is unset.
    pub fn get_or<'a>(&'a self, name: &str, not_set: &'a Value) -> &'a Value {
        self.values.get(name).unwrap_or(not_set)
    }

    pub fn has(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// New snapshot with `name` set to `value`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if no descriptor is named `name`.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<Self, Error> {
        self.descriptors.get(name)?;
        let mut values = self.values.clone();
        values.insert(name.to_string(), value.into());
        Ok(Self { descriptors: Arc::clone(&self.descriptors), values })
    }

    /// New snapshot with `name` unset.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if no descriptor is named `name`.
    pub fn delete(&self, name: &str) -> Result<Self, Error> {
        self.descriptors.get(name)?;
        let mut values = self.values.clone();
        values.remove(name);
        Ok(Self { descriptors: Arc::clone(&self.descriptors), values })
    }

    pub fn encoder(&self, name: &str) -> Result<&Encoder, Error> {
        Ok(&self.descriptors.get(name)?.encoder)
    }

    pub fn matcher(&self, name: &str) -> Result<&Matcher, Error> {
        Ok(&self.descriptors.get(name)?.matcher)
    }

    /// Effective refiner of `name` (the matcher when none was configured).
    pub fn refiner(&self, name: &str) -> Result<&Refiner, Error> {
        let descriptor = self.descriptors.get(name)?;
        Ok(descriptor.refiner.as_ref().unwrap_or(&descriptor.matcher))
    }

    pub fn property_accessor(&self, name: &str) -> Result<&Accessor<T>, Error> {
        Ok(&self.descriptors.get(name)?.accessor)
    }

    /// Encoded values of the parameters that are set. Unset parameters are absent.
    pub fn values_to_string_map(&self) -> BTreeMap<String, String> {
        self.descriptors
            .iter()
            .filter_map(|d| self.values.get(&d.name).map(|v| (d.name.clone(), (d.encoder)(v))))
            .collect()
    }

    /// Form-encoded query string of the set parameters, in name order.
    pub fn to_query_string(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.values_to_string_map())
            .finish()
    }

    /// Whether `item` satisfies every parameter that is set.
    pub fn matches(&self, item: &T) -> bool {
        self.descriptors.iter().all(|d| match self.values.get(&d.name) {
            None => true,
            Some(value) => (d.matcher)(&(d.accessor)(item), value),
        })
    }

    /// Whether this snapshot keeps or tightens every constraint of `other`.
    pub fn is_refinement_of(&self, other: &Self) -> bool {
        self.descriptors.iter().all(|d| match other.values.get(&d.name) {
            None => true,
            Some(old) => self.values.get(&d.name).is_some_and(|new| d.refines(new, old)),
        })
    }

    pub fn is_proper_refinement_of(&self, other: &Self) -> bool {
        self != other && self.is_refinement_of(other)
    }
}

impl<T> PartialEq for ParameterSnapshot<T> {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

impl<T> Eq for ParameterSnapshot<T> {}

impl<T> fmt::Debug for ParameterSnapshot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ParameterSnapshot").field(&self.values).finish()
    }
}

impl<T> fmt::Display for ParameterSnapshot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.values.is_empty() { f.write_str("<empty>") } else { f.write_str(&self.to_query_string()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Item, descriptors, item};
    use serde_json::json;

    fn empty() -> ParameterSnapshot<Item> {
        ParameterSnapshot::empty(descriptors())
    }

    #[test]
    fn test_set_round_trip() {
        let snapshot = empty().set("a", "abc").unwrap();
        let map = snapshot.values_to_string_map();
        assert_eq!(map.len(), 1);
        assert_eq!(map["a"], "abc");
        assert_eq!(snapshot.to_query_string(), "a=abc");
        assert_eq!(empty().set("a", "abc").unwrap(), empty().set("a", "abc").unwrap());
    }

    #[test]
    fn test_set_is_copy_on_write() {
        let base = empty().set("a", "abc").unwrap();
        let edited = base.set("a", "abcd").unwrap();
        let deleted = base.delete("a").unwrap();
        assert_eq!(base.get("a"), Some(&json!("abc")));
        assert_eq!(edited.get("a"), Some(&json!("abcd")));
        assert!(!deleted.has("a"));
        assert!(Arc::ptr_eq(base.descriptors(), edited.descriptors()));
    }

    #[test]
    fn test_unknown_parameter_is_configuration_error() {
        let snapshot = empty();
        assert!(matches!(snapshot.set("nope", 1), Err(Error::Configuration(_))));
        assert!(matches!(snapshot.delete("nope"), Err(Error::Configuration(_))));
        assert!(matches!(snapshot.encoder("nope"), Err(Error::Configuration(_))));
        assert!(matches!(snapshot.matcher("nope"), Err(Error::Configuration(_))));
        assert!(matches!(snapshot.refiner("nope"), Err(Error::Configuration(_))));
        assert!(matches!(snapshot.property_accessor("nope"), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_unset_differs_from_null() {
        let unset = empty();
        let null = empty().set("a", Value::Null).unwrap();
        assert!(!unset.has("a"));
        assert!(null.has("a"));
        assert_ne!(unset, null);
        assert!(unset.values_to_string_map().is_empty());
        assert_eq!(null.values_to_string_map()["a"], "null");

        let fallback = json!("fallback");
        assert_eq!(unset.get_or("a", &fallback), &fallback);
        assert_eq!(null.get_or("a", &fallback), &Value::Null);
    }

    #[test]
    fn test_default_encoder_and_accessor() {
        let snapshot = empty().set("n", 42).unwrap();
        assert_eq!(snapshot.values_to_string_map()["n"], "42");

        let accessor = snapshot.property_accessor("a").unwrap();
        assert_eq!(accessor(&item("abc")), json!("abc"));
        let accessor = snapshot.property_accessor("n").unwrap();
        assert_eq!(accessor(&item("abc")), Value::Null);
    }

    #[test]
    fn test_matches_is_conjunction() {
        let snapshot = empty().set("a", "bc").unwrap();
        assert!(snapshot.matches(&item("abc")));
        assert!(!snapshot.matches(&item("ab")));
        assert!(empty().matches(&item("anything")));

        let both = snapshot.set("n", 1).unwrap();
        assert!(!both.matches(&item("abc")), "n is null on fixture items");
    }

    #[test]
    fn test_refinement() {
        let abc = empty().set("a", "abc").unwrap();
        let abcdef = empty().set("a", "abcdef").unwrap();
        let abcdf = empty().set("a", "abcdf").unwrap();

        assert!(abc.is_refinement_of(&empty()));
        assert!(!empty().is_refinement_of(&abc));
        assert!(abcdef.is_refinement_of(&abc));
        assert!(!abc.is_refinement_of(&abcdef));
        assert!(abcdf.is_refinement_of(&abc));
        assert!(!abcdf.is_refinement_of(&abcdef));

        assert!(abc.is_refinement_of(&abc));
        assert!(!abc.is_proper_refinement_of(&abc));
        assert!(abcdef.is_proper_refinement_of(&abc));
    }

    #[test]
    fn test_refiner_argument_order() {
        let descriptors = Arc::new(DescriptorSet::new([ParamDescriptor::<Item>::new("max")
            .matcher(|item, param| item.as_i64() <= param.as_i64())
            .refiner(|new, old| new.as_i64() <= old.as_i64())]));
        let empty = ParameterSnapshot::empty(descriptors);
        let ten = empty.set("max", 10).unwrap();
        let five = empty.set("max", 5).unwrap();
        assert!(five.is_refinement_of(&ten));
        assert!(!ten.is_refinement_of(&five));
    }

    #[test]
    fn test_refinement_never_readmits_items() {
        let values = ["", "a", "ab", "abc", "abcd", "b", "bc", "cd"];
        let items: Vec<Item> = crate::testing::FIXTURE.iter().map(|a| item(a)).collect();

        for old in values {
            for new in values {
                let s1 = empty().set("a", old).unwrap();
                let s2 = empty().set("a", new).unwrap();
                if !s2.is_refinement_of(&s1) {
                    continue;
                }
                for x in &items {
                    if !s1.matches(x) {
                        assert!(!s2.matches(x), "{s2} re-admitted {x:?} excluded by {s1}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(empty().to_string(), "<empty>");
        let snapshot = empty().set("a", "x y").unwrap().set("n", 3).unwrap();
        assert_eq!(snapshot.to_string(), "a=x+y&n=3");
    }
}
