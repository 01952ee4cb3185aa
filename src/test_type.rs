use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Path segment used when a label does not name a known test type.
pub const GENERIC_SEGMENT: &str = "generic";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestType {
    RampUp,
    Qps,
    Spike,
    Soak,
    Stress,
    DataDriven,
}

// Label and backend path segment for every test type, in tab order.
const TEST_TYPES: [(TestType, &str, &str); 6] = [
    (TestType::RampUp, "Ramp-Up Test", "ramp-up"),
    (TestType::Qps, "QPS Test", "qps"),
    (TestType::Spike, "Spike Test", "spike"),
    (TestType::Soak, "Soak Test", "soak"),
    (TestType::Stress, "Stress Test", "stress"),
    (TestType::DataDriven, "Data-Driven Test", "data-driven"),
];

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown test type `{0}` (expected one of: ramp-up, qps, spike, soak, stress, data-driven)")]
pub struct UnknownTestType(pub String);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("`{field}` is not a load parameter of the {test_type}")]
pub struct UndeclaredField {
    pub field: String,
    pub test_type: TestType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Numeric,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Name of the field on the wire, e.g. `spawnRate`.
    pub name: &'static str,
    pub kind: FieldKind,
}

impl FieldSpec {
    /// Human readable label, `spawnRate` becomes `Spawn Rate`.
    pub fn label(&self) -> String {
        let mut label = String::with_capacity(self.name.len() + 4);
        for (i, c) in self.name.chars().enumerate() {
            if i == 0 {
                label.extend(c.to_uppercase());
            } else if c.is_uppercase() {
                label.push(' ');
                label.push(c);
            } else {
                label.push(c);
            }
        }
        label
    }
}

/// Generates one parameter struct per test type together with the
/// [`LoadParams`] union and the field table behind [`TestType::fields`].
macro_rules! load_params {
    ($(
        $variant:ident($params:ident) {
            $($field:ident: $wire:literal as $kind:ident),* $(,)?
        }
    )*) => {
        $(
            #[derive(Debug, Clone, Default, PartialEq, Eq)]
            pub struct $params {
                $(pub $field: String,)*
            }

            impl $params {
                pub const FIELDS: &'static [FieldSpec] = &[
                    $(FieldSpec { name: $wire, kind: FieldKind::$kind },)*
                ];

                fn slot(&self, name: &str) -> Option<&String> {
                    match name {
                        $($wire => Some(&self.$field),)*
                        _ => None,
                    }
                }

                fn slot_mut(&mut self, name: &str) -> Option<&mut String> {
                    match name {
                        $($wire => Some(&mut self.$field),)*
                        _ => None,
                    }
                }
            }
        )*

        /// Load-shape parameters. The variant always matches the selected
        /// test type, so a field that does not belong to it can't be stored.
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub enum LoadParams {
            $($variant($params),)*
        }

        impl LoadParams {
            /// Every declared field of `test_type` set to an empty string.
            pub fn empty(test_type: TestType) -> Self {
                match test_type {
                    $(TestType::$variant => LoadParams::$variant($params::default()),)*
                }
            }

            pub fn test_type(&self) -> TestType {
                match self {
                    $(LoadParams::$variant(_) => TestType::$variant,)*
                }
            }

            fn slot(&self, name: &str) -> Option<&String> {
                match self {
                    $(LoadParams::$variant(params) => params.slot(name),)*
                }
            }

            fn slot_mut(&mut self, name: &str) -> Option<&mut String> {
                match self {
                    $(LoadParams::$variant(params) => params.slot_mut(name),)*
                }
            }
        }

        impl TestType {
            /// The load parameters declared for this test type, in form order.
            pub fn fields(self) -> &'static [FieldSpec] {
                match self {
                    $(TestType::$variant => $params::FIELDS,)*
                }
            }
        }
    };
}

load_params! {
    RampUp(RampUpParams) {
        users: "users" as Numeric,
        spawn_rate: "spawnRate" as Numeric,
        duration: "duration" as Numeric,
        think_time_range: "thinkTimeRange" as Text,
    }
    Qps(QpsParams) {
        target_qps: "targetQps" as Numeric,
        users: "users" as Numeric,
        spawn_rate: "spawnRate" as Numeric,
        duration: "duration" as Numeric,
        think_time_range: "thinkTimeRange" as Text,
    }
    Spike(SpikeParams) {
        start_users: "startUsers" as Numeric,
        spike_users: "spikeUsers" as Numeric,
        spike_after: "spikeAfter" as Numeric,
        duration: "duration" as Numeric,
    }
    Soak(SoakParams) {
        users: "users" as Numeric,
        duration: "duration" as Numeric,
        think_time_range: "thinkTimeRange" as Text,
    }
    Stress(StressParams) {
        start_users: "startUsers" as Numeric,
        end_users: "endUsers" as Text,
        step_users: "stepUsers" as Text,
        duration_per_step: "durationPerStep" as Numeric,
    }
    DataDriven(DataDrivenParams) {
        users: "users" as Numeric,
        spawn_rate: "spawnRate" as Numeric,
        duration: "duration" as Numeric,
    }
}

impl TestType {
    pub const ALL: [TestType; 6] = [
        TestType::RampUp,
        TestType::Qps,
        TestType::Spike,
        TestType::Soak,
        TestType::Stress,
        TestType::DataDriven,
    ];

    pub fn label(self) -> &'static str {
        TEST_TYPES
            .iter()
            .find(|(test_type, _, _)| *test_type == self)
            .map(|(_, label, _)| *label)
            .unwrap_or_default()
    }

    pub fn path_segment(self) -> &'static str {
        segment_for_label(self.label())
    }

    /// Value of the `load_type` form field, e.g. `RAMP_UP_TEST`.
    pub fn load_type_token(self) -> String {
        load_type_token(self.label())
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TestType {
    type Err = UnknownTestType;

    /// Accepts the display label (`Spike Test`), the path segment (`spike`)
    /// or the load-type token (`SPIKE_TEST`), case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        TEST_TYPES
            .iter()
            .find(|(test_type, label, segment)| {
                wanted.eq_ignore_ascii_case(label)
                    || wanted.eq_ignore_ascii_case(segment)
                    || wanted.eq_ignore_ascii_case(&test_type.load_type_token())
            })
            .map(|(test_type, _, _)| *test_type)
            .ok_or_else(|| UnknownTestType(s.to_string()))
    }
}

pub fn segment_for_label(label: &str) -> &'static str {
    TEST_TYPES
        .iter()
        .find(|(_, known, _)| *known == label)
        .map(|(_, _, segment)| *segment)
        .unwrap_or(GENERIC_SEGMENT)
}

pub fn load_type_token(label: &str) -> String {
    label.to_uppercase().replace([' ', '-'], "_")
}

impl LoadParams {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.slot(name).map(String::as_str)
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) -> Result<(), UndeclaredField> {
        let test_type = self.test_type();
        let slot = self.slot_mut(name).ok_or_else(|| UndeclaredField {
            field: name.to_string(),
            test_type,
        })?;
        *slot = value.into();
        Ok(())
    }

    /// All declared fields with their current value, in form order.
    pub fn entries(&self) -> Vec<(&'static FieldSpec, &str)> {
        self.test_type()
            .fields()
            .iter()
            .filter_map(|spec| self.get(spec.name).map(|value| (spec, value)))
            .collect()
    }

    /// Fields that carry something other than whitespace.
    pub fn non_empty_entries(&self) -> Vec<(&'static FieldSpec, &str)> {
        self.entries()
            .into_iter()
            .filter(|(_, value)| !value.trim().is_empty())
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_params_declare_exactly_the_type_fields() {
        for test_type in TestType::ALL {
            let params = LoadParams::empty(test_type);
            let names: Vec<&str> = params.entries().iter().map(|(s, _)| s.name).collect();
            let declared: Vec<&str> = test_type.fields().iter().map(|s| s.name).collect();

            assert_eq!(names, declared, "{test_type}");
            assert!(params.entries().iter().all(|(_, value)| value.is_empty()));
            assert_eq!(params.test_type(), test_type);
        }
    }

    #[test]
    fn spike_fields() {
        let names: Vec<&str> = TestType::Spike.fields().iter().map(|s| s.name).collect();
        assert_eq!(names, ["startUsers", "spikeUsers", "spikeAfter", "duration"]);
    }

    #[test]
    fn set_rejects_fields_of_other_types() {
        let mut params = LoadParams::empty(TestType::Spike);

        params.set("spikeUsers", "100").unwrap();
        assert_eq!(params.get("spikeUsers"), Some("100"));

        let err = params.set("users", "10").unwrap_err();
        assert_eq!(err.field, "users");
        assert_eq!(err.test_type, TestType::Spike);
        assert_eq!(params.get("users"), None);
    }

    #[test]
    fn non_empty_entries_skip_blank_values() {
        let mut params = LoadParams::empty(TestType::RampUp);
        params.set("users", "10").unwrap();
        params.set("spawnRate", "  ").unwrap();
        params.set("thinkTimeRange", "1-3").unwrap();

        let entries: Vec<(&str, &str)> = params
            .non_empty_entries()
            .into_iter()
            .map(|(s, v)| (s.name, v))
            .collect();
        assert_eq!(entries, [("users", "10"), ("thinkTimeRange", "1-3")]);
    }

    #[test]
    fn segments_and_tokens() {
        assert_eq!(TestType::RampUp.path_segment(), "ramp-up");
        assert_eq!(TestType::DataDriven.path_segment(), "data-driven");
        assert_eq!(TestType::RampUp.load_type_token(), "RAMP_UP_TEST");
        assert_eq!(TestType::Qps.load_type_token(), "QPS_TEST");
        assert_eq!(TestType::DataDriven.load_type_token(), "DATA_DRIVEN_TEST");
    }

    #[test]
    fn unknown_label_falls_back_to_generic() {
        assert_eq!(segment_for_label("Chaos Test"), GENERIC_SEGMENT);
        assert_eq!(segment_for_label(""), GENERIC_SEGMENT);
    }

    #[test]
    fn parse_accepts_labels_segments_and_tokens() {
        assert_eq!("Spike Test".parse::<TestType>(), Ok(TestType::Spike));
        assert_eq!("data-driven".parse::<TestType>(), Ok(TestType::DataDriven));
        assert_eq!("QPS_TEST".parse::<TestType>(), Ok(TestType::Qps));
        assert_eq!(
            "chaos".parse::<TestType>(),
            Err(UnknownTestType("chaos".into()))
        );
    }

    #[test]
    fn field_labels() {
        let spec = FieldSpec {
            name: "durationPerStep",
            kind: FieldKind::Numeric,
        };
        assert_eq!(spec.label(), "Duration Per Step");
    }
}
