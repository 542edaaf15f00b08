//! Scope sets requested from and granted by the token endpoint.

// std
use std::collections::BTreeSet;
// crates.io
use serde::{Deserializer, Serializer, de::Error as DeError};
// self
use crate::_prelude::*;

/// Errors emitted when validating scopes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ScopeValidationError {
	/// Empty scope entries are not allowed.
	#[error("Scope entries cannot be empty.")]
	Empty,
	/// Scopes cannot contain embedded whitespace characters.
	#[error("Scope contains whitespace: {scope}.")]
	ContainsWhitespace {
		/// The offending scope string.
		scope: String,
	},
}

/// Normalized set of OAuth scopes (for example `meeting:read user:read`).
///
/// Entries are deduplicated and sorted, so two sets requested in a different order compare
/// equal and render to the same space-delimited wire string.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeSet(Arc<[String]>);
impl ScopeSet {
	/// Creates a normalized scope set from any iterator.
	pub fn new<I, S>(scopes: I) -> Result<Self, ScopeValidationError>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		normalize(scopes).map(Self)
	}

	/// Number of distinct scopes.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns true if no scopes are defined.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Returns true if the normalized set contains the provided scope.
	pub fn contains(&self, scope: &str) -> bool {
		self.0.binary_search_by(|candidate| candidate.as_str().cmp(scope)).is_ok()
	}

	/// Iterator over normalized scopes.
	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.0.iter().map(String::as_str)
	}

	/// Space-delimited wire form.
	pub fn normalized(&self) -> String {
		self.0.join(" ")
	}
}
impl Debug for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("ScopeSet").field(&self.0).finish()
	}
}
impl Display for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.normalized())
	}
}
impl FromStr for ScopeSet {
	type Err = ScopeValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.is_empty() {
			return Ok(Self::default());
		}
		if s.chars().all(char::is_whitespace) {
			return Err(ScopeValidationError::Empty);
		}

		Self::new(s.split_whitespace())
	}
}
impl Serialize for ScopeSet {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.collect_seq(self.iter())
	}
}
impl<'de> Deserialize<'de> for ScopeSet {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		// Token endpoints report `scope` as a space-delimited string; snapshots store a list.
		#[derive(Deserialize)]
		#[serde(untagged)]
		enum Repr {
			Delimited(String),
			List(Vec<String>),
		}

		match Repr::deserialize(deserializer)? {
			Repr::Delimited(raw) => ScopeSet::from_str(&raw).map_err(DeError::custom),
			Repr::List(values) => ScopeSet::new(values).map_err(DeError::custom),
		}
	}
}

fn normalize<I, S>(scopes: I) -> Result<Arc<[String]>, ScopeValidationError>
where
	I: IntoIterator<Item = S>,
	S: Into<String>,
{
	let mut set = BTreeSet::new();

	for scope in scopes {
		let owned: String = scope.into();

		if owned.is_empty() {
			return Err(ScopeValidationError::Empty);
		}
		if owned.chars().any(char::is_whitespace) {
			return Err(ScopeValidationError::ContainsWhitespace { scope: owned });
		}

		set.insert(owned);
	}

	Ok(Arc::from(set.into_iter().collect::<Vec<_>>()))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn scopes_normalize_order_and_duplicates() {
		let lhs = ScopeSet::new(["user:read", "meeting:read", "meeting:read"])
			.expect("Left-hand scope set should be valid.");
		let rhs = ScopeSet::new(["meeting:read", "user:read"])
			.expect("Right-hand scope set should be valid.");

		assert_eq!(lhs, rhs);
		assert_eq!(lhs.normalized(), "meeting:read user:read");
		assert_eq!(lhs.len(), 2);
	}

	#[test]
	fn scopes_reject_whitespace_padding() {
		let err = ScopeSet::new([" meeting:read "]).expect_err("Padded scopes must be rejected.");

		assert!(matches!(err, ScopeValidationError::ContainsWhitespace { .. }));
		assert!(ScopeSet::new([""]).is_err());
		assert!(ScopeSet::from_str("").is_ok(), "Empty string represents an empty scope set.");
		assert!(ScopeSet::from_str("   ").is_err(), "Whitespace-only input must be rejected.");
	}

	#[test]
	fn iter_and_contains_work() {
		let scopes = ScopeSet::from_str("recording:read meeting:write")
			.expect("Scope string should parse successfully.");

		assert!(scopes.contains("meeting:write"));
		assert!(!scopes.contains("meeting:read"));
		assert_eq!(scopes.iter().collect::<Vec<_>>(), vec!["meeting:write", "recording:read"]);
		assert_eq!(scopes.to_string(), "meeting:write recording:read");
	}

	#[test]
	fn deserializes_from_string_or_list() {
		let from_string: ScopeSet = serde_json::from_str("\"user:read meeting:read\"")
			.expect("Space-delimited scopes should deserialize.");
		let from_list: ScopeSet = serde_json::from_str("[\"meeting:read\",\"user:read\"]")
			.expect("Scope lists should deserialize.");

		assert_eq!(from_string, from_list);
		assert_eq!(
			serde_json::to_string(&from_list).expect("Scope set should serialize."),
			"[\"meeting:read\",\"user:read\"]"
		);
	}
}
