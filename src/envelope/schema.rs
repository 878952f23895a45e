//! Envelope schema loaded from a protobuf definition
//!
//! Only the subset needed to locate the payload field is understood:
//! `syntax`, `package`, `import` and `option` statements, nested `message`
//! blocks, scalar and map fields, and the members of `oneof` groups, which
//! count as fields of the enclosing message. `enum`, `service` and `extend`
//! blocks are skipped.

use crate::result::SchemaError;
use pest::error::LineColLocation;
use pest::iterators::Pair;
use pest::Parser;
use std::collections::HashMap;

/// Fully qualified type of the envelope message.
pub const DEFAULT_MESSAGE_TYPE: &str = "proto.Data";

/// Name of the payload field inside the envelope.
pub const DATA_FIELD: &str = "data";

/// The resolved envelope layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    message: String,
    data_tag: u32,
}

impl Schema {
    /// Layout without parsing a definition.
    pub fn new(message: impl Into<String>, data_tag: u32) -> Self {
        Self {
            message: message.into(),
            data_tag,
        }
    }

    /// Parse `definition` and look up `message_type` (e.g. `proto.Data`).
    ///
    /// The type must declare a `bytes` field named `data`.
    ///
    /// # Examples
    ///
    /// ```
    /// use shellmod::Schema;
    ///
    /// let schema = Schema::parse(
    ///     r#"
    ///     syntax = "proto3";
    ///     package proto;
    ///     message Data { bytes data = 1; }
    ///     "#,
    ///     "proto.Data",
    /// ).unwrap();
    /// assert_eq!(schema.data_tag(), 1);
    /// ```
    pub fn parse(definition: &str, message_type: &str) -> Result<Self, SchemaError> {
        let messages = parse_messages(definition)?;

        let fields = messages
            .get(message_type)
            .ok_or_else(|| SchemaError::TypeNotFound(message_type.to_string()))?;
        let field = fields
            .iter()
            .find(|f| f.name == DATA_FIELD)
            .ok_or_else(|| SchemaError::FieldNotFound {
                message: message_type.to_string(),
                field: DATA_FIELD.to_string(),
            })?;
        if field.ty != "bytes" || field.repeated {
            let found = if field.repeated {
                format!("repeated {}", field.ty)
            } else {
                field.ty.clone()
            };
            return Err(SchemaError::FieldType {
                field: DATA_FIELD.to_string(),
                found,
            });
        }

        Ok(Self::new(message_type, field.tag))
    }

    /// Fully qualified message type
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Field number of the payload
    pub fn data_tag(&self) -> u32 {
        self.data_tag
    }
}

#[derive(pest_derive::Parser)]
#[grammar = "envelope/proto.pest"]
struct ProtoParser;

#[derive(Debug)]
struct Field {
    name: String,
    ty: String,
    tag: u32,
    repeated: bool,
}

impl From<pest::error::Error<Rule>> for SchemaError {
    fn from(e: pest::error::Error<Rule>) -> Self {
        let line = match e.line_col {
            LineColLocation::Pos((line, _)) | LineColLocation::Span((line, _), _) => line,
        };
        SchemaError::Parse {
            line,
            message: e.variant.message().into_owned(),
        }
    }
}

/// Parse a definition into fully qualified message names and their fields.
fn parse_messages(definition: &str) -> Result<HashMap<String, Vec<Field>>, SchemaError> {
    let statements: Vec<Pair<'_, Rule>> = ProtoParser::parse(Rule::file, definition)?
        .flat_map(|file| file.into_inner())
        .collect();

    // The package applies to the whole file wherever it is declared
    let package = statements
        .iter()
        .filter(|pair| pair.as_rule() == Rule::package_stmt)
        .flat_map(|pair| pair.clone().into_inner())
        .find(|pair| pair.as_rule() == Rule::full_ident)
        .map(|pair| pair.as_str().to_string())
        .unwrap_or_default();

    let mut messages = HashMap::new();
    for pair in statements {
        if pair.as_rule() == Rule::message {
            collect_message(pair, &package, &mut messages)?;
        }
    }
    Ok(messages)
}

fn collect_message(
    pair: Pair<'_, Rule>,
    scope: &str,
    messages: &mut HashMap<String, Vec<Field>>,
) -> Result<(), SchemaError> {
    let mut full_name = scope.to_string();
    let mut fields = Vec::new();
    let mut nested = Vec::new();

    for item in pair.into_inner() {
        match item.as_rule() {
            Rule::ident => {
                full_name = if scope.is_empty() {
                    item.as_str().to_string()
                } else {
                    format!("{}.{}", scope, item.as_str())
                };
            }
            Rule::field => fields.push(parse_field(item)?),
            Rule::map_field => fields.push(parse_map_field(item)?),
            Rule::oneof => {
                for member in item.into_inner() {
                    match member.as_rule() {
                        Rule::field => fields.push(parse_field(member)?),
                        Rule::map_field => fields.push(parse_map_field(member)?),
                        _ => {}
                    }
                }
            }
            Rule::message => nested.push(item),
            _ => {}
        }
    }

    for item in nested {
        collect_message(item, &full_name, messages)?;
    }
    messages.insert(full_name, fields);
    Ok(())
}

fn parse_field(pair: Pair<'_, Rule>) -> Result<Field, SchemaError> {
    let mut field = Field {
        name: String::new(),
        ty: String::new(),
        tag: 0,
        repeated: false,
    };
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::label => field.repeated = part.as_str() == "repeated",
            Rule::type_name => field.ty = part.as_str().to_string(),
            Rule::ident => field.name = part.as_str().to_string(),
            Rule::int_lit => field.tag = field_number(&part)?,
            _ => {}
        }
    }
    Ok(field)
}

fn parse_map_field(pair: Pair<'_, Rule>) -> Result<Field, SchemaError> {
    let mut types = Vec::new();
    let mut name = String::new();
    let mut tag = 0;
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::type_name => types.push(part.as_str()),
            Rule::ident => name = part.as_str().to_string(),
            Rule::int_lit => tag = field_number(&part)?,
            _ => {}
        }
    }
    Ok(Field {
        name,
        ty: format!("map<{}>", types.join(", ")),
        tag,
        repeated: false,
    })
}

fn field_number(pair: &Pair<'_, Rule>) -> Result<u32, SchemaError> {
    pair.as_str()
        .parse::<u32>()
        .ok()
        .filter(|n| (1..=536_870_911).contains(n))
        .ok_or_else(|| SchemaError::Parse {
            line: pair.line_col().0,
            message: format!("invalid field number {}", pair.as_str()),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MESSAGES_PROTO: &str = r#"
        syntax = "proto3";
        package proto;

        // Envelope for every shell frame
        message Data {
            bytes data = 1;
        }
    "#;

    #[test]
    fn test_parse_default_envelope() {
        let schema = Schema::parse(MESSAGES_PROTO, DEFAULT_MESSAGE_TYPE).unwrap();
        assert_eq!(schema.message(), "proto.Data");
        assert_eq!(schema.data_tag(), 1);
    }

    #[test]
    fn test_parse_nested_and_extra_fields() {
        let definition = r#"
            syntax = "proto3";
            package shell.v1;
            option go_package = "x";

            enum Kind { KIND_UNSPECIFIED = 0; }

            message Outer {
                reserved 2, 3;
                message Frame {
                    uint32 seq = 1;
                    bytes data = 7 [deprecated = false];
                }
                string name = 1;
            }
        "#;

        let schema = Schema::parse(definition, "shell.v1.Outer.Frame").unwrap();
        assert_eq!(schema.data_tag(), 7);
    }

    #[test]
    fn test_oneof_members_are_fields() {
        let definition = r#"
            package proto;
            message Data {
                uint32 seq = 1;
                oneof body {
                    string text = 2;
                    bytes data = 3 [deprecated = false];
                }
            }
        "#;
        let schema = Schema::parse(definition, "proto.Data").unwrap();
        assert_eq!(schema.data_tag(), 3);
    }

    #[test]
    fn test_type_not_found() {
        let result = Schema::parse(MESSAGES_PROTO, "proto.Other");
        assert!(matches!(result, Err(SchemaError::TypeNotFound(ref t)) if t == "proto.Other"));
    }

    #[test]
    fn test_field_not_found() {
        let result = Schema::parse("message Data { bytes payload = 1; }", "Data");
        assert!(matches!(result, Err(SchemaError::FieldNotFound { .. })));
    }

    #[test]
    fn test_wrong_field_type() {
        let result = Schema::parse("message Data { string data = 1; }", "Data");
        assert!(matches!(result, Err(SchemaError::FieldType { ref found, .. }) if found == "string"));

        let result = Schema::parse("message Data { repeated bytes data = 1; }", "Data");
        assert!(matches!(result, Err(SchemaError::FieldType { .. })));
    }

    #[test]
    fn test_parse_error_reports_line() {
        let result = Schema::parse("package proto;\nmessage Data {\n  bytes data = ;\n}", "proto.Data");
        assert!(matches!(result, Err(SchemaError::Parse { line: 3, .. })));
    }

    #[test]
    fn test_unterminated_block() {
        let result = Schema::parse("message Data { bytes data = 1;", "Data");
        assert!(matches!(result, Err(SchemaError::Parse { .. })));
    }
}
