//! Bounded constant sets used by the value-set enumerator.

/// Largest set tracked before a value degrades to [`ValueSet::Unknown`].
pub const MAX_VALUES: usize = 16;

/// Tracked value - either unknown or a bounded set of possible constants.
///
/// `Constant(vec![])` is the empty set: no value reaches this point (yet).
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum ValueSet {
    /// Too many possibilities, or computed from something opaque.
    #[default]
    Unknown,
    /// One of these values (sorted, deduplicated).
    Constant(Vec<u64>),
}

impl ValueSet {
    pub const fn empty() -> Self {
        Self::Constant(Vec::new())
    }

    pub fn constant(value: u64) -> Self {
        Self::Constant(vec![value])
    }

    /// Build from arbitrary values; more than [`MAX_VALUES`] distinct values is unknown.
    pub fn from_values(values: impl IntoIterator<Item = u64>) -> Self {
        let mut set = Self::empty();
        for value in values {
            set.add_value(value);
            if set.is_unknown() {
                break;
            }
        }
        set
    }

    pub const fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    pub fn values(&self) -> Option<&[u64]> {
        match self {
            Self::Constant(v) => Some(v),
            Self::Unknown => None,
        }
    }

    /// The single value, if the set has exactly one.
    pub fn single(&self) -> Option<u64> {
        match self.values() {
            Some([value]) => Some(*value),
            _ => None,
        }
    }

    /// Add a value to the set (maintains sorted order).
    pub fn add_value(&mut self, value: u64) {
        if let Self::Constant(values) = self {
            match values.binary_search(&value) {
                Ok(_) => {}
                Err(pos) => {
                    if values.len() >= MAX_VALUES {
                        *self = Self::Unknown;
                    } else {
                        values.insert(pos, value);
                    }
                }
            }
        }
    }

    /// Union of two sets.
    pub fn merge(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Unknown, _) | (_, Self::Unknown) => Self::Unknown,
            (Self::Constant(a), Self::Constant(b)) => {
                let mut merged = Vec::with_capacity(a.len() + b.len());
                let (mut i, mut j) = (0, 0);
                while i < a.len() && j < b.len() {
                    match a[i].cmp(&b[j]) {
                        std::cmp::Ordering::Less => {
                            merged.push(a[i]);
                            i += 1;
                        }
                        std::cmp::Ordering::Greater => {
                            merged.push(b[j]);
                            j += 1;
                        }
                        std::cmp::Ordering::Equal => {
                            merged.push(a[i]);
                            i += 1;
                            j += 1;
                        }
                    }
                    if merged.len() > MAX_VALUES {
                        return Self::Unknown;
                    }
                }
                merged.extend_from_slice(&a[i..]);
                merged.extend_from_slice(&b[j..]);
                if merged.len() > MAX_VALUES {
                    return Self::Unknown;
                }
                Self::Constant(merged)
            }
        }
    }

    /// Apply `f` to every value. A `None` from `f` makes the whole result unknown.
    pub fn map(&self, f: impl Fn(u64) -> Option<u64>) -> Self {
        let Self::Constant(values) = self else {
            return Self::Unknown;
        };
        let mut out = Self::empty();
        for &value in values {
            match f(value) {
                Some(mapped) => out.add_value(mapped),
                None => return Self::Unknown,
            }
        }
        out
    }

    /// Apply `f` to every pair drawn from the two sets.
    pub fn product(&self, other: &Self, f: impl Fn(u64, u64) -> Option<u64>) -> Self {
        let (Self::Constant(a), Self::Constant(b)) = (self, other) else {
            return Self::Unknown;
        };
        if a.len().saturating_mul(b.len()) > MAX_VALUES * MAX_VALUES {
            return Self::Unknown;
        }
        let mut out = Self::empty();
        for &x in a {
            for &y in b {
                match f(x, y) {
                    Some(value) => out.add_value(value),
                    None => return Self::Unknown,
                }
                if out.is_unknown() {
                    return Self::Unknown;
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_set_constant() {
        let v = ValueSet::constant(42);
        assert_eq!(v.values(), Some(&[42][..]));
        assert_eq!(v.single(), Some(42));
    }

    #[test]
    fn test_value_set_merge() {
        let merged = ValueSet::from_values([3, 1]).merge(&ValueSet::from_values([2, 3]));
        assert_eq!(merged.values(), Some(&[1, 2, 3][..]));
        assert!(merged.merge(&ValueSet::Unknown).is_unknown());
        assert_eq!(ValueSet::empty().merge(&ValueSet::constant(9)).single(), Some(9));
    }

    #[test]
    fn test_value_set_overflow() {
        let set = ValueSet::from_values(0..=MAX_VALUES as u64);
        assert!(set.is_unknown());
        let full = ValueSet::from_values(0..MAX_VALUES as u64);
        assert_eq!(full.values().map(<[u64]>::len), Some(MAX_VALUES));
        assert!(full.merge(&ValueSet::constant(100)).is_unknown());
    }

    #[test]
    fn test_value_set_product() {
        let a = ValueSet::from_values([0x1000, 0x2000]);
        let b = ValueSet::from_values([8, 0x10]);
        let sums = a.product(&b, |x, y| x.checked_add(y));
        assert_eq!(sums.values(), Some(&[0x1008, 0x1010, 0x2008, 0x2010][..]));
        assert!(a.product(&b, |_, _| None).is_unknown());
    }
}
