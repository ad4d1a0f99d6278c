use crate::entity::ScalarKind;
use crate::graphql::{Scalar, __InputValue, __Type, __TypeKind, ___Type};
use crate::gson;
use graphql_parser::query::*;
use indexmap::IndexMap;

pub fn alias_or_name<'a, T>(query_field: &graphql_parser::query::Field<'a, T>) -> String
where
    T: Text<'a> + Eq + AsRef<str>,
{
    query_field
        .alias
        .as_ref()
        .map(|x| x.as_ref().to_string())
        .unwrap_or_else(|| query_field.name.as_ref().to_string())
}

/// Flattens fragment spreads and inline fragments. `type_names` holds the
/// concrete type being selected followed by the abstract types it belongs to,
/// so `... on Production` applies to a `Movie` implementing it.
pub fn normalize_selection_set<'a, 'b, T>(
    selection_set: &'b SelectionSet<'a, T>,
    fragment_definitions: &'b Vec<FragmentDefinition<'a, T>>,
    type_names: &[String],
) -> Result<Vec<&'b Field<'a, T>>, String>
where
    T: Text<'a> + Eq + AsRef<str>,
{
    let mut selections: Vec<&'b Field<'a, T>> = vec![];

    for selection in &selection_set.items {
        selections.extend(normalize_selection(selection, fragment_definitions, type_names)?);
    }
    Ok(selections)
}

fn condition_applies<'a, T>(condition: &TypeCondition<'a, T>, type_names: &[String]) -> bool
where
    T: Text<'a> + Eq + AsRef<str>,
{
    match condition {
        TypeCondition::On(name) => type_names.iter().any(|x| x == name.as_ref()),
    }
}

/// Normalizes literal selections, fragment spreads, and inline fragments
pub fn normalize_selection<'a, 'b, T>(
    query_selection: &'b Selection<'a, T>,
    fragment_definitions: &'b Vec<FragmentDefinition<'a, T>>,
    type_names: &[String],
) -> Result<Vec<&'b Field<'a, T>>, String>
where
    T: Text<'a> + Eq + AsRef<str>,
{
    let mut selections: Vec<&Field<'a, T>> = vec![];

    match query_selection {
        Selection::Field(field) => {
            selections.push(field);
        }
        Selection::FragmentSpread(fragment_spread) => {
            let frag_name = &fragment_spread.fragment_name;

            let frag_def = fragment_definitions
                .iter()
                .find(|x| &x.name == frag_name)
                .ok_or_else(|| format!("Unknown fragment \"{}\"", frag_name.as_ref()))?;

            // a spread on another member of an abstract type contributes nothing
            if condition_applies(&frag_def.type_condition, type_names) {
                selections.extend(normalize_selection_set(
                    &frag_def.selection_set,
                    fragment_definitions,
                    type_names,
                )?);
            }
        }
        Selection::InlineFragment(inline_fragment) => {
            let inline_fragment_applies: bool = match &inline_fragment.type_condition {
                Some(condition) => condition_applies(condition, type_names),
                None => true,
            };

            if inline_fragment_applies {
                selections.extend(normalize_selection_set(
                    &inline_fragment.selection_set,
                    fragment_definitions,
                    type_names,
                )?);
            }
        }
    }

    Ok(selections)
}

pub fn to_gson<'a, T>(
    graphql_value: &Value<'a, T>,
    variables: &serde_json::Value,
) -> Result<gson::Value, String>
where
    T: Text<'a> + AsRef<str>,
{
    let result = match graphql_value {
        Value::Null => gson::Value::Null,
        Value::Boolean(x) => gson::Value::Boolean(*x),
        Value::Int(x) => match x.as_i64() {
            Some(num) => gson::Value::Number(gson::Number::Integer(num)),
            None => return Err("Invalid Int input".to_string()),
        },
        Value::Float(x) => gson::Value::Number(gson::Number::Float(*x)),
        Value::String(x) => gson::Value::String(x.to_owned()),
        Value::Enum(x) => gson::Value::String(x.as_ref().to_string()),
        Value::List(x_arr) => {
            let mut out_arr: Vec<gson::Value> = vec![];
            for x in x_arr {
                out_arr.push(to_gson(x, variables)?);
            }
            gson::Value::Array(out_arr)
        }
        Value::Object(obj) => {
            let mut out_map: IndexMap<String, gson::Value> = IndexMap::new();
            for (key, graphql_val) in obj.iter() {
                out_map.insert(key.as_ref().to_string(), to_gson(graphql_val, variables)?);
            }
            gson::Value::Object(out_map)
        }
        Value::Variable(var_name) => match variables.get(var_name.as_ref()) {
            None => gson::Value::Absent,
            Some(x) => gson::json_to_gson(x)?,
        },
    };
    Ok(result)
}

fn validate_scalar(kind: ScalarKind, value: &gson::Value) -> Result<gson::Value, String> {
    use crate::gson::Number as GsonNumber;
    use crate::gson::Value as GsonValue;

    let invalid = || format!("Invalid input for {} type", kind.name());
    let res = match (kind, value) {
        (_, GsonValue::Absent | GsonValue::Null) => value.clone(),
        (ScalarKind::ID, GsonValue::Number(GsonNumber::Integer(x))) => GsonValue::String(x.to_string()),
        (ScalarKind::Int, GsonValue::Number(GsonNumber::Integer(x))) => {
            if i32::try_from(*x).is_err() {
                return Err(format!("Int cannot represent non 32-bit signed integer value: {}", x));
            }
            value.clone()
        }
        (ScalarKind::Float, GsonValue::Number(_)) => value.clone(),
        (ScalarKind::Boolean, GsonValue::Boolean(_)) => value.clone(),
        (ScalarKind::BigInt, GsonValue::String(_) | GsonValue::Number(GsonNumber::Integer(_))) => {
            value.clone()
        }
        (k, GsonValue::String(_)) if k.is_string_like() || k.is_temporal() => value.clone(),
        _ => return Err(invalid()),
    };
    Ok(res)
}

pub fn validate_arg_from_type(type_: &__Type, value: &gson::Value) -> Result<gson::Value, String> {
    use crate::gson::Value as GsonValue;

    let res: GsonValue = match type_ {
        __Type::Scalar(Scalar::Builtin(kind)) => validate_scalar(*kind, value)?,
        // custom scalars are opaque
        __Type::Scalar(Scalar::Custom(_)) => value.clone(),
        __Type::Enum(enum_) => match value {
            GsonValue::Absent | GsonValue::Null => value.clone(),
            GsonValue::String(user_input_string) => {
                let matches_enum_value = enum_
                    .enum_values(true)
                    .into_iter()
                    .flatten()
                    .any(|x| x.name().as_str() == user_input_string);
                match matches_enum_value {
                    true => value.clone(),
                    false => {
                        return Err(format!(
                            "Invalid input for {} type",
                            enum_.name().unwrap_or_default()
                        ))
                    }
                }
            }
            _ => {
                return Err(format!(
                    "Invalid input for {} type",
                    enum_.name().unwrap_or_default()
                ))
            }
        },
        __Type::List(list_type) => {
            let inner_type: &__Type = &list_type.type_;
            match value {
                GsonValue::Absent | GsonValue::Null => value.clone(),
                GsonValue::Array(input_arr) => {
                    let mut output_arr = vec![];
                    for input_elem in input_arr {
                        output_arr.push(validate_arg_from_type(inner_type, input_elem)?);
                    }
                    GsonValue::Array(output_arr)
                }
                _ => {
                    // Single elements must be coerced to a single element list
                    let out_elem = validate_arg_from_type(inner_type, value)?;
                    GsonValue::Array(vec![out_elem])
                }
            }
        }
        __Type::NonNull(nonnull_type) => {
            let out_elem = validate_arg_from_type(&nonnull_type.type_, value)?;
            match out_elem {
                GsonValue::Absent | GsonValue::Null => {
                    return Err(format!(
                        "Invalid input for NonNull type {}",
                        type_.render()
                    ))
                }
                _ => out_elem,
            }
        }
        __Type::Input(_) => validate_arg_from_input_object(type_, value)?,
        _ => {
            return Err(format!(
                "Invalid Type used as input argument {}",
                type_.name().unwrap_or_default()
            ))
        }
    };
    Ok(res)
}

/// Validates an input object. Keys keep the order the user wrote them in, which
/// sort arguments and nested mutations depend on.
pub fn validate_arg_from_input_object(
    input_type: &__Type,
    value: &gson::Value,
) -> Result<gson::Value, String> {
    use crate::gson::Value as GsonValue;

    let input_type_name = input_type.name().unwrap_or_default();

    if input_type.kind() != __TypeKind::INPUT_OBJECT {
        return Err(format!("Invalid input type {}", input_type_name));
    }

    let res: GsonValue = match value {
        GsonValue::Absent | GsonValue::Null => value.clone(),
        GsonValue::Object(input_obj) => {
            let type_input_fields: Vec<__InputValue> = input_type.input_fields().unwrap_or_default();

            // Confirm that there are no extra keys
            let extra_input_keys: Vec<&String> = input_obj
                .keys()
                .filter(|k| !type_input_fields.iter().any(|x| &x.name_ == *k))
                .collect();
            if !extra_input_keys.is_empty() {
                return Err(format!(
                    "Input for type {} contains extra keys {:?}",
                    input_type_name, extra_input_keys
                ));
            }

            // Required members must be present
            for obj_field in &type_input_fields {
                if !input_obj.contains_key(&obj_field.name_) && obj_field.default_value.is_none() {
                    validate_arg_from_type(&obj_field.type_, &GsonValue::Null)?;
                }
            }

            let mut out_map: IndexMap<String, GsonValue> = IndexMap::new();
            for (key, x) in input_obj {
                if let Some(obj_field) = type_input_fields.iter().find(|f| &f.name_ == key) {
                    out_map.insert(key.clone(), validate_arg_from_type(&obj_field.type_, x)?);
                }
            }
            GsonValue::Object(out_map)
        }
        _ => return Err(format!("Invalid input for {} type", input_type_name)),
    };
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Config;
    use crate::entity::EntityModel;
    use crate::graphql::__Schema;
    use graphql_parser::schema::parse_schema;
    use serde_json::json;
    use std::sync::Arc;

    fn types() -> std::collections::HashMap<String, __Type> {
        let doc = parse_schema::<String>(
            "type Movie { title: String!, runtime: Int, genre: Genre } enum Genre { ACTION DRAMA }",
        )
        .unwrap();
        __Schema::new(Arc::new(EntityModel::build(&doc, &Config::default()).unwrap())).type_map()
    }

    fn gson(value: serde_json::Value) -> gson::Value {
        gson::json_to_gson(&value).unwrap()
    }

    #[test]
    fn input_objects_keep_user_key_order() {
        let types = types();
        let validated = validate_arg_from_type(
            &types["MovieSort"],
            &gson(json!({"runtime": "DESC", "title": "ASC"})),
        )
        .unwrap();
        let keys: Vec<&String> = validated.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["runtime", "title"]);
    }

    #[test]
    fn extra_keys_are_rejected() {
        let types = types();
        let err = validate_arg_from_type(&types["MovieWhere"], &gson(json!({"rating": 1}))).unwrap_err();
        assert!(err.contains("extra keys"));
    }

    #[test]
    fn required_members_must_be_provided() {
        let types = types();
        assert!(validate_arg_from_type(&types["MovieCreateInput"], &gson(json!({"runtime": 1}))).is_err());
        assert!(
            validate_arg_from_type(&types["MovieCreateInput"], &gson(json!({"title": "Heat"}))).is_ok()
        );
    }

    #[test]
    fn scalars_and_enums_are_checked() {
        let types = types();
        let where_ = &types["MovieWhere"];
        assert!(validate_arg_from_type(where_, &gson(json!({"runtime": "long"}))).is_err());
        assert!(validate_arg_from_type(where_, &gson(json!({"genre": "ACTION"}))).is_ok());
        assert!(validate_arg_from_type(where_, &gson(json!({"genre": "HORROR"}))).is_err());
    }

    #[test]
    fn single_values_coerce_to_lists() {
        let types = types();
        let validated =
            validate_arg_from_type(&types["MovieWhere"], &gson(json!({"title_IN": "Heat"}))).unwrap();
        assert_eq!(validated.get("title_IN"), &gson(json!(["Heat"])));
    }

    #[test]
    fn missing_variables_are_absent() {
        let value: Value<String> = Value::Variable("limit".to_string());
        assert_eq!(to_gson(&value, &json!({})).unwrap(), gson::Value::Absent);
        assert_eq!(to_gson(&value, &json!({"limit": 3})).unwrap(), gson(json!(3)));
    }
}
