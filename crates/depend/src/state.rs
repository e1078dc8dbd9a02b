use derive_more::Display;

/// Aggregate verdict over any number of tracked files.
///
/// Verdicts only ever get worse when merged: [`State::Ok`] is the identity,
/// anything modified beats ok, and anything missing beats both.
#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum State {
    #[default]
    #[display("ok")]
    Ok,
    #[display("modified")]
    Modified,
    #[display("missing")]
    Missing,
}
impl State {
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        self.max(other)
    }

    pub fn merge_all(states: impl IntoIterator<Item = Self>) -> Self {
        states.into_iter().fold(Self::Ok, Self::merge)
    }

    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    /// Anything other than ok means something has to be rebuilt.
    pub fn is_modified(self) -> bool {
        self != Self::Ok
    }

    pub fn is_missing(self) -> bool {
        self == Self::Missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(State::Ok, State::Ok, State::Ok)]
    #[case(State::Ok, State::Modified, State::Modified)]
    #[case(State::Modified, State::Ok, State::Modified)]
    #[case(State::Modified, State::Missing, State::Missing)]
    #[case(State::Missing, State::Modified, State::Missing)]
    #[case(State::Missing, State::Ok, State::Missing)]
    fn test_merge(#[case] a: State, #[case] b: State, #[case] expected: State) {
        assert_eq!(a.merge(b), expected);
    }

    #[test]
    fn test_merge_all() {
        assert_eq!(State::merge_all([]), State::Ok);
        assert_eq!(State::merge_all([State::Ok, State::Modified, State::Ok]), State::Modified);
        assert!(State::merge_all([State::Modified, State::Missing]).is_missing());
    }
}
