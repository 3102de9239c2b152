//! Service Control Protocol Description (SCPD) parsing.
//!
//! The SCPD declares a service's actions and state variables. It is
//! fetched once per service and parsed into an immutable schema that
//! action invocation validates against: argument names and order,
//! in/out direction, the related state variable, its data type, and any
//! allowed-value list or range.

use serde::Deserialize;

use crate::error::{DescriptionError, Result};
use crate::value::{DataType, Value, ValueError};

/// Direction of an action argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Argument supplied by the caller
    In,
    /// Argument returned by the device
    Out,
}

/// A declared action argument.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    /// Argument name
    pub name: String,
    /// Whether the argument is supplied or returned
    pub direction: Direction,
    /// Name of the state variable declaring the argument's type
    pub related_state_variable: String,
}

/// A declared action with its ordered argument list.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    /// Action name
    pub name: String,
    /// Arguments in declared order
    pub arguments: Vec<Argument>,
}

impl Action {
    /// In-arguments in declared order.
    pub fn in_arguments(&self) -> impl Iterator<Item = &Argument> {
        self.arguments.iter().filter(|a| a.direction == Direction::In)
    }

    /// Out-arguments in declared order.
    pub fn out_arguments(&self) -> impl Iterator<Item = &Argument> {
        self.arguments.iter().filter(|a| a.direction == Direction::Out)
    }
}

/// Numeric range constraint on a state variable.
#[derive(Debug, Clone, PartialEq)]
pub struct AllowedRange {
    /// Inclusive lower bound
    pub minimum: f64,
    /// Inclusive upper bound
    pub maximum: f64,
    /// Step between allowed values, when declared
    pub step: Option<f64>,
}

impl AllowedRange {
    /// Whether a numeric value lies within the range.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.minimum && value <= self.maximum
    }
}

/// A declared state variable.
#[derive(Debug, Clone, PartialEq)]
pub struct StateVariable {
    /// Variable name
    pub name: String,
    /// Declared data type
    pub data_type: DataType,
    /// Default value, when declared
    pub default_value: Option<String>,
    /// Allowed values; empty means unconstrained
    pub allowed_values: Vec<String>,
    /// Allowed numeric range, when declared
    pub allowed_range: Option<AllowedRange>,
    /// Whether changes to the variable are evented
    pub send_events: bool,
}

impl StateVariable {
    /// Coerce a raw value against the declared type and constraints.
    pub fn validate(&self, raw: &str) -> std::result::Result<Value, ValueError> {
        let value = self.data_type.coerce(raw)?;

        let mismatch = || ValueError {
            value: raw.to_string(),
            data_type: self.data_type,
        };

        if !self.allowed_values.is_empty() && !self.allowed_values.iter().any(|v| v == raw) {
            return Err(mismatch());
        }

        if let (Some(range), Some(magnitude)) = (&self.allowed_range, value.as_f64()) {
            if !range.contains(magnitude) {
                return Err(mismatch());
            }
        }

        Ok(value)
    }
}

/// Parsed SCPD: the immutable schema of one service.
#[derive(Debug, Clone, PartialEq)]
pub struct Scpd {
    /// Declared actions
    pub actions: Vec<Action>,
    /// Declared state variables
    pub state_variables: Vec<StateVariable>,
}

impl Scpd {
    /// Parse an SCPD document from XML.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let raw: RawScpd = quick_xml::de::from_str(xml)
            .map_err(|e| DescriptionError::Parse(format!("failed to parse SCPD: {e}")))?;
        raw.try_into()
    }

    /// Look up a declared action by name.
    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name == name)
    }

    /// Look up a declared state variable by name.
    pub fn state_variable(&self, name: &str) -> Option<&StateVariable> {
        self.state_variables.iter().find(|v| v.name == name)
    }
}

#[derive(Debug, Deserialize)]
struct RawScpd {
    #[serde(rename = "actionList")]
    action_list: Option<RawActionList>,
    #[serde(rename = "serviceStateTable")]
    state_table: RawStateTable,
}

#[derive(Debug, Deserialize)]
struct RawActionList {
    #[serde(rename = "action", default)]
    actions: Vec<RawAction>,
}

#[derive(Debug, Deserialize)]
struct RawAction {
    name: String,
    #[serde(rename = "argumentList")]
    argument_list: Option<RawArgumentList>,
}

#[derive(Debug, Deserialize)]
struct RawArgumentList {
    #[serde(rename = "argument", default)]
    arguments: Vec<RawArgument>,
}

#[derive(Debug, Deserialize)]
struct RawArgument {
    name: String,
    direction: String,
    #[serde(rename = "relatedStateVariable", default)]
    related_state_variable: String,
}

#[derive(Debug, Deserialize)]
struct RawStateTable {
    #[serde(rename = "stateVariable", default)]
    variables: Vec<RawStateVariable>,
}

#[derive(Debug, Deserialize)]
struct RawStateVariable {
    #[serde(rename = "@sendEvents")]
    send_events: Option<String>,
    name: String,
    #[serde(rename = "dataType")]
    data_type: String,
    #[serde(rename = "defaultValue")]
    default_value: Option<String>,
    #[serde(rename = "allowedValueList")]
    allowed_value_list: Option<RawAllowedValueList>,
    #[serde(rename = "allowedValueRange")]
    allowed_value_range: Option<RawAllowedValueRange>,
}

#[derive(Debug, Deserialize)]
struct RawAllowedValueList {
    #[serde(rename = "allowedValue", default)]
    values: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawAllowedValueRange {
    minimum: String,
    maximum: String,
    step: Option<String>,
}

impl TryFrom<RawScpd> for Scpd {
    type Error = DescriptionError;

    fn try_from(raw: RawScpd) -> Result<Self> {
        let actions = raw
            .action_list
            .map(|list| list.actions)
            .unwrap_or_default()
            .into_iter()
            .map(|action| {
                let arguments = action
                    .argument_list
                    .map(|list| list.arguments)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|arg| {
                        let direction = match arg.direction.as_str() {
                            "in" => Direction::In,
                            "out" => Direction::Out,
                            other => {
                                return Err(DescriptionError::Parse(format!(
                                    "invalid argument direction {other:?} in action {}",
                                    action.name
                                )))
                            }
                        };
                        Ok(Argument {
                            name: arg.name,
                            direction,
                            related_state_variable: arg.related_state_variable,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;

                Ok(Action {
                    name: action.name,
                    arguments,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let state_variables = raw
            .state_table
            .variables
            .into_iter()
            .map(|variable| {
                let allowed_range = variable
                    .allowed_value_range
                    .map(|range| -> Result<AllowedRange> {
                        let parse = |field: &str, value: &str| {
                            value.trim().parse::<f64>().map_err(|_| {
                                DescriptionError::Parse(format!(
                                    "invalid {field} {value:?} in state variable {}",
                                    variable.name
                                ))
                            })
                        };
                        Ok(AllowedRange {
                            minimum: parse("minimum", &range.minimum)?,
                            maximum: parse("maximum", &range.maximum)?,
                            step: match range.step {
                                Some(step) => Some(parse("step", &step)?),
                                None => None,
                            },
                        })
                    })
                    .transpose()?;

                Ok(StateVariable {
                    data_type: DataType::from_name(&variable.data_type),
                    default_value: variable.default_value,
                    allowed_values: variable
                        .allowed_value_list
                        .map(|list| list.values)
                        .unwrap_or_default(),
                    allowed_range,
                    // sendEvents defaults to yes per the UPnP architecture
                    send_events: variable.send_events.as_deref() != Some("no"),
                    name: variable.name,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Scpd {
            actions,
            state_variables,
        })
    }
}
