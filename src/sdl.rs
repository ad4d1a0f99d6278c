//! Renders the generated schema as SDL.

use crate::graphql::*;
use itertools::Itertools;

/// Renders a JSON value as a GraphQL literal, e.g. default values
pub fn format_json_value(value: &serde_json::Value) -> String {
    use serde_json::Value as JsonValue;
    match value {
        JsonValue::Null => "null".to_string(),
        JsonValue::Bool(x) => x.to_string(),
        JsonValue::Number(x) => x.to_string(),
        JsonValue::String(x) => quote(x),
        JsonValue::Array(x) => format!("[{}]", x.iter().map(format_json_value).join(", ")),
        JsonValue::Object(x) => format!(
            "{{{}}}",
            x.iter()
                .map(|(k, v)| format!("{}: {}", k, format_json_value(v)))
                .join(", ")
        ),
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn description(desc: &Option<String>, indent: &str) -> String {
    match desc {
        Some(d) if d.contains('\n') || d.contains('"') => {
            format!("{indent}\"\"\"\n{indent}{}\n{indent}\"\"\"\n", d.replace('\n', &format!("\n{indent}")))
        }
        Some(d) => format!("{indent}\"\"\"{}\"\"\"\n", d),
        None => String::new(),
    }
}

fn deprecation(reason: &Option<String>) -> String {
    match reason {
        Some(r) => format!(" @deprecated(reason: {})", quote(r)),
        None => String::new(),
    }
}

fn input_value(iv: &__InputValue) -> String {
    let mut res = format!("{}: {}", iv.name(), iv.type_().render());
    if let Some(default) = &iv.default_value {
        res.push_str(&format!(" = {}", default));
    }
    res.push_str(&deprecation(&iv.deprecation_reason));
    res
}

fn directives_suffix(directives: &[String]) -> String {
    directives.iter().map(|d| format!(" {}", d)).join("")
}

fn print_field(field: &__Field) -> String {
    let args = match field.args.is_empty() {
        true => String::new(),
        false => format!("({})", field.args.iter().map(input_value).join(", ")),
    };
    format!(
        "{}  {}{}: {}{}{}",
        description(&field.description, "  "),
        field.name(),
        args,
        field.type_().render(),
        directives_suffix(&field.directives),
        deprecation(&field.deprecation_reason)
    )
}

fn print_type(type_: &__Type) -> Option<String> {
    let name = type_.name()?;
    let head = description(&type_.description(), "");
    let body = match type_.kind() {
        __TypeKind::SCALAR => {
            if let __Type::Scalar(Scalar::Builtin(kind)) = type_ {
                if kind.is_builtin_graphql() {
                    return None;
                }
            }
            format!("scalar {}", name)
        }
        __TypeKind::ENUM => format!(
            "enum {} {{\n{}\n}}",
            name,
            type_
                .enum_values(true)
                .unwrap_or_default()
                .iter()
                .map(|v| format!("{}  {}", description(&v.description, "  "), v.name()))
                .join("\n")
        ),
        __TypeKind::UNION => format!(
            "union {} = {}",
            name,
            type_
                .possible_types()
                .unwrap_or_default()
                .iter()
                .filter_map(|x| x.name())
                .join(" | ")
        ),
        __TypeKind::INPUT_OBJECT => format!(
            "input {} {{\n{}\n}}",
            name,
            type_
                .input_fields()
                .unwrap_or_default()
                .iter()
                .map(|iv| format!("{}  {}", description(&iv.description, "  "), input_value(iv)))
                .join("\n")
        ),
        __TypeKind::OBJECT | __TypeKind::INTERFACE => {
            let keyword = match type_.kind() {
                __TypeKind::INTERFACE => "interface",
                _ => "type",
            };
            let interfaces = type_
                .interfaces()
                .unwrap_or_default()
                .iter()
                .filter_map(|x| x.name())
                .collect::<Vec<_>>();
            let implements = match interfaces.is_empty() {
                true => String::new(),
                false => format!(" implements {}", interfaces.join(" & ")),
            };
            format!(
                "{} {}{}{} {{\n{}\n}}",
                keyword,
                name,
                implements,
                directives_suffix(&type_.directives()),
                type_
                    .fields(true)
                    .unwrap_or_default()
                    .iter()
                    .map(print_field)
                    .join("\n")
            )
        }
        __TypeKind::LIST | __TypeKind::NON_NULL => return None,
    };
    Some(format!("{}{}", head, body))
}

/// The full augmented schema. Types are sorted by name so identical type
/// definitions always print identically.
pub fn print_schema(schema: &__Schema) -> String {
    let mut blocks = vec![];
    let mut roots = vec!["  query: Query".to_string()];
    if schema.mutations_exist() {
        roots.push("  mutation: Mutation".to_string());
    }
    blocks.push(format!("schema {{\n{}\n}}", roots.join("\n")));
    blocks.extend(schema.types().iter().filter_map(print_type));
    blocks.join("\n\n") + "\n"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Config;
    use crate::entity::EntityModel;
    use graphql_parser::schema::parse_schema;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn print(sdl: &str) -> String {
        let doc = parse_schema::<String>(sdl).unwrap();
        let model = EntityModel::build(&doc, &Config::default()).unwrap();
        print_schema(&__Schema::new(Arc::new(model)))
    }

    #[test]
    fn json_literals_render_as_graphql() {
        let value = serde_json::json!({"a": [1, "two", null], "b": true});
        assert_eq!(format_json_value(&value), r#"{a: [1, "two", null], b: true}"#);
    }

    #[test]
    fn deprecated_members_carry_their_reason() {
        let sdl = print("type Movie { title: String }");
        assert!(sdl.contains("title_NOT: String @deprecated(reason: \"Negation filters will be deprecated"));
        assert!(sdl.contains("schema {\n  query: Query\n  mutation: Mutation\n}"));
        assert!(sdl.contains("type Movie {\n  title: String\n}"));
    }

    #[test]
    fn defaults_are_rendered_on_create_inputs() {
        let sdl = print(r#"type Movie { title: String! @default(value: "Untitled"), rating: Int }"#);
        assert!(sdl.contains("input MovieCreateInput {\n  title: String = \"Untitled\"\n  rating: Int\n}"));
    }

    #[test]
    fn field_descriptions_carry_over_to_write_inputs() {
        let sdl = print(r#"type Movie { "Display title" title: String }"#);
        assert!(sdl.contains("input MovieCreateInput {\n  \"\"\"Display title\"\"\"\n  title: String\n}"));
        assert!(sdl.contains("input MovieUpdateInput {\n  \"\"\"Display title\"\"\"\n  title: String\n"));
    }

    #[test]
    fn unions_list_their_members() {
        let sdl = print(
            r#"
            union Search = Movie | Genre
            type Movie { title: String, search: [Search!]! @relationship(type: "SEARCH", direction: OUT) }
            type Genre { name: String }
            "#,
        );
        assert!(sdl.contains("union Search = Movie | Genre"));
        assert!(sdl.contains("input MovieSearchCreateInput {"));
    }

    proptest! {
        #[test]
        fn printing_is_deterministic(name in "[A-Z][a-z]{2,8}", field in "[a-z]{3,8}") {
            let sdl = format!("type {} {{ {}: String }}", name, field);
            prop_assert_eq!(print(&sdl), print(&sdl));
        }
    }
}
