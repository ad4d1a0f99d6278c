use serde::Serialize;

/// A response member that is either rendered or left out of the payload entirely.
/// Used together with `#[serde(skip_serializing_if = "Omit::is_omit")]`.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum Omit<T> {
    Omitted,
    Present(T),
}

impl<T> Omit<T> {
    pub fn is_omit(&self) -> bool {
        matches!(self, Self::Omitted)
    }

    pub fn as_option(&self) -> Option<&T> {
        match self {
            Self::Omitted => None,
            Self::Present(x) => Some(x),
        }
    }
}

impl<T> From<Option<T>> for Omit<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(x) => Self::Present(x),
            None => Self::Omitted,
        }
    }
}
