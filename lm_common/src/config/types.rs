use log::LevelFilter;
use serde_yaml::Value;
use std::str::FromStr;

/// A type that can be read out of a config value.
pub trait YamlValue {
  /// If the yaml value matches this type, returns Some(v).
  fn from_yaml(v: &Value) -> Option<Self>
  where
    Self: Sized;

  /// The name of this type (string, integer, etc), for error messages.
  fn name() -> String
  where
    Self: Sized;
}

impl YamlValue for bool {
  fn from_yaml(v: &Value) -> Option<Self> { v.as_bool() }

  fn name() -> String { "bool".into() }
}

impl YamlValue for String {
  fn from_yaml(v: &Value) -> Option<Self> { v.as_str().map(|v| v.into()) }

  fn name() -> String { "string".into() }
}

impl YamlValue for LevelFilter {
  fn from_yaml(v: &Value) -> Option<Self> { LevelFilter::from_str(v.as_str()?).ok() }

  fn name() -> String { "log level filter".into() }
}

impl<T> YamlValue for Vec<T>
where
  T: YamlValue,
{
  fn from_yaml(v: &Value) -> Option<Self> {
    v.as_sequence().and_then(|v| v.iter().map(|v| T::from_yaml(v)).collect::<Option<Vec<T>>>())
  }

  fn name() -> String { format!("array of {}", T::name()) }
}

macro_rules! yaml_number {
  ($name:expr, $($ty:ty),*) => {
    $(
      impl YamlValue for $ty {
        fn from_yaml(v: &Value) -> Option<Self> {
          v.as_i64().and_then(|v| v.try_into().ok())
        }

        fn name() -> String {
          $name.into()
        }
      }
    )*
  };
}

yaml_number!("integer", u8, u16, u32, u64, usize, i8, i16, i32, i64);

impl YamlValue for f32 {
  fn from_yaml(v: &Value) -> Option<Self> { v.as_f64().map(|v| v as f32) }

  fn name() -> String { "float".into() }
}

impl YamlValue for f64 {
  fn from_yaml(v: &Value) -> Option<Self> { v.as_f64() }

  fn name() -> String { "float".into() }
}
