//! SDL to executable schema
//!
//! Parses an endpoint's SDL and builds an `async-graphql` dynamic schema.
//! Field resolution order: the configured resolver for `Type.field`
//! (templated response or structured error), then the parent's JSON value,
//! then name-pattern synthesis for leaves.

use async_graphql::dynamic::{
    Enum, Field, FieldFuture, FieldValue, InputObject, InputValue, Object, ResolverContext,
    Scalar, Schema, TypeRef,
};
use async_graphql::parser::types::{
    BaseType, TypeDefinition, TypeKind, TypeSystemDefinition,
};
use async_graphql::{ErrorExtensions, Name, Value as GqlValue};
use mockd_core::model::{GraphqlEndpoint, GraphqlResolver};
use mockd_core::template::{render_value, RenderContext};
use mockd_core::{Error, Result};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Build a dynamic schema from the endpoint's SDL and resolver map
pub fn build_schema(endpoint: &GraphqlEndpoint) -> Result<Schema> {
    let document = async_graphql::parser::parse_schema(&endpoint.schema)
        .map_err(|e| Error::validation_field(format!("invalid SDL: {e}"), "graphql.schema"))?;

    let mut query_type = "Query".to_string();
    let mut mutation_type: Option<String> = None;
    let mut objects: Vec<(String, Vec<FieldDef>)> = Vec::new();
    let mut composite_names: HashSet<String> = HashSet::new();
    let mut registered: Vec<RegisteredType> = Vec::new();

    for definition in &document.definitions {
        match definition {
            TypeSystemDefinition::Schema(schema_def) => {
                if let Some(query) = &schema_def.node.query {
                    query_type = query.node.to_string();
                }
                mutation_type = schema_def
                    .node
                    .mutation
                    .as_ref()
                    .map(|m| m.node.to_string());
            }
            TypeSystemDefinition::Type(type_def) => {
                collect_type(
                    &type_def.node,
                    &mut objects,
                    &mut composite_names,
                    &mut registered,
                );
            }
            TypeSystemDefinition::Directive(_) => {}
        }
    }

    // A type literally named Mutation is the mutation root by convention.
    if mutation_type.is_none() && objects.iter().any(|(name, _)| name == "Mutation") {
        mutation_type = Some("Mutation".to_string());
    }

    let resolvers = Arc::new(endpoint.resolvers.clone());
    let composites = Arc::new(composite_names);

    let mut builder = Schema::build(query_type.as_str(), mutation_type.as_deref(), None::<&str>);
    for (type_name, fields) in objects {
        let mut object = Object::new(type_name.clone());
        for field_def in fields {
            object = object.field(make_field(
                &type_name,
                field_def,
                Arc::clone(&resolvers),
                Arc::clone(&composites),
            ));
        }
        builder = builder.register(object);
    }
    for ty in registered {
        builder = match ty {
            RegisteredType::Enum(e) => builder.register(e),
            RegisteredType::Scalar(s) => builder.register(s),
            RegisteredType::Input(i) => builder.register(i),
        };
    }
    if !endpoint.introspection {
        builder = builder.disable_introspection();
    }
    builder
        .finish()
        .map_err(|e| Error::validation_field(format!("schema build failed: {e}"), "graphql.schema"))
}

enum RegisteredType {
    Enum(Enum),
    Scalar(Scalar),
    Input(InputObject),
}

struct FieldDef {
    name: String,
    type_ref: TypeRef,
    base_type: String,
    is_list: bool,
    arguments: Vec<InputValue>,
}

fn collect_type(
    type_def: &TypeDefinition,
    objects: &mut Vec<(String, Vec<FieldDef>)>,
    composite_names: &mut HashSet<String>,
    registered: &mut Vec<RegisteredType>,
) {
    let name = type_def.name.node.to_string();
    match &type_def.kind {
        TypeKind::Object(object) => {
            composite_names.insert(name.clone());
            let fields = object
                .fields
                .iter()
                .map(|field| {
                    let ast_type = &field.node.ty.node;
                    FieldDef {
                        name: field.node.name.node.to_string(),
                        type_ref: convert_type(ast_type),
                        base_type: base_type_name(&ast_type.base),
                        is_list: is_list_type(&ast_type.base),
                        arguments: field
                            .node
                            .arguments
                            .iter()
                            .map(|arg| {
                                InputValue::new(
                                    arg.node.name.node.to_string(),
                                    convert_type(&arg.node.ty.node),
                                )
                            })
                            .collect(),
                    }
                })
                .collect();
            objects.push((name, fields));
        }
        TypeKind::Enum(enum_type) => {
            let mut e = Enum::new(name);
            for value in &enum_type.values {
                e = e.item(value.node.value.node.to_string());
            }
            registered.push(RegisteredType::Enum(e));
        }
        TypeKind::Scalar => {
            registered.push(RegisteredType::Scalar(Scalar::new(name)));
        }
        TypeKind::InputObject(input) => {
            let mut i = InputObject::new(name);
            for field in &input.fields {
                i = i.field(InputValue::new(
                    field.node.name.node.to_string(),
                    convert_type(&field.node.ty.node),
                ));
            }
            registered.push(RegisteredType::Input(i));
        }
        // Interfaces and unions are outside the mockable subset.
        TypeKind::Interface(_) | TypeKind::Union(_) => {}
    }
}

fn convert_type(ast: &async_graphql::parser::types::Type) -> TypeRef {
    let inner = match &ast.base {
        BaseType::Named(name) => TypeRef::Named(name.to_string().into()),
        BaseType::List(item) => TypeRef::List(Box::new(convert_type(item))),
    };
    if ast.nullable {
        inner
    } else {
        TypeRef::NonNull(Box::new(inner))
    }
}

fn base_type_name(base: &BaseType) -> String {
    match base {
        BaseType::Named(name) => name.to_string(),
        BaseType::List(item) => base_type_name(&item.base),
    }
}

fn is_list_type(base: &BaseType) -> bool {
    matches!(base, BaseType::List(_))
}

fn make_field(
    type_name: &str,
    def: FieldDef,
    resolvers: Arc<HashMap<String, GraphqlResolver>>,
    composites: Arc<HashSet<String>>,
) -> Field {
    let key = format!("{type_name}.{}", def.name);
    let field_name = def.name.clone();
    let base_type = def.base_type.clone();
    let is_list = def.is_list;

    let mut field = Field::new(def.name.clone(), def.type_ref, move |ctx: ResolverContext| {
        let key = key.clone();
        let field_name = field_name.clone();
        let base_type = base_type.clone();
        let resolvers = Arc::clone(&resolvers);
        let composites = Arc::clone(&composites);
        FieldFuture::new(async move {
            resolve_field(&ctx, &key, &field_name, &base_type, is_list, &resolvers, &composites)
        })
    });
    for argument in def.arguments {
        field = field.argument(argument);
    }
    field
}

fn resolve_field(
    ctx: &ResolverContext,
    key: &str,
    field_name: &str,
    base_type: &str,
    is_list: bool,
    resolvers: &HashMap<String, GraphqlResolver>,
    composites: &HashSet<String>,
) -> async_graphql::Result<Option<FieldValue<'static>>> {
    let is_composite = composites.contains(base_type);

    if let Some(resolver) = resolvers.get(key) {
        if let Some(error) = &resolver.error {
            let mut err = async_graphql::Error::new(error.message.clone());
            if let Some(Value::Object(extensions)) = &error.extensions {
                let extensions = extensions.clone();
                err = err.extend_with(|_, ext| {
                    for (name, value) in &extensions {
                        if let Ok(value) = GqlValue::from_json(value.clone()) {
                            ext.set(name, value);
                        }
                    }
                });
            }
            return Err(err);
        }
        if let Some(response) = &resolver.response {
            let render_ctx = RenderContext {
                args: Some(args_to_json(ctx)),
                ..RenderContext::default()
            };
            let rendered = render_value(response, &render_ctx);
            return Ok(Some(json_field_value(rendered, is_composite, is_list)?));
        }
    }

    // Fall back to the parent's JSON value when it carries this field.
    if let Some(parent) = ctx.parent_value.downcast_ref::<Value>() {
        if let Some(value) = parent.get(field_name) {
            return Ok(Some(json_field_value(value.clone(), is_composite, is_list)?));
        }
    }

    Ok(Some(synthesize(field_name, base_type, is_composite, is_list)?))
}

fn args_to_json(ctx: &ResolverContext) -> Value {
    let map: serde_json::Map<String, Value> = ctx
        .args
        .as_index_map()
        .iter()
        .map(|(name, value): (&Name, &GqlValue)| (name.to_string(), value.clone().into_json().unwrap_or(Value::Null)))
        .collect();
    Value::Object(map)
}

fn json_field_value(
    value: Value,
    is_composite: bool,
    is_list: bool,
) -> async_graphql::Result<FieldValue<'static>> {
    if value.is_null() {
        // A null leaf renders as null; lists and objects too.
        return Ok(FieldValue::value(GqlValue::Null));
    }
    if is_list {
        let Value::Array(items) = value else {
            return Ok(FieldValue::list(vec![json_field_value(
                value,
                is_composite,
                false,
            )?]));
        };
        let converted: async_graphql::Result<Vec<FieldValue<'static>>> = items
            .into_iter()
            .map(|item| json_field_value(item, is_composite, false))
            .collect();
        return Ok(FieldValue::list(converted?));
    }
    if is_composite {
        return Ok(FieldValue::owned_any(value));
    }
    GqlValue::from_json(value)
        .map(FieldValue::value)
        .map_err(|e| async_graphql::Error::new(format!("invalid scalar value: {e}")))
}

fn synthesize(
    field_name: &str,
    base_type: &str,
    is_composite: bool,
    is_list: bool,
) -> async_graphql::Result<FieldValue<'static>> {
    if is_list {
        return Ok(FieldValue::list(Vec::<FieldValue<'static>>::new()));
    }
    if is_composite {
        return Ok(FieldValue::owned_any(Value::Object(serde_json::Map::new())));
    }
    let value = default_leaf(field_name, base_type);
    GqlValue::from_json(value)
        .map(FieldValue::value)
        .map_err(|e| async_graphql::Error::new(format!("synthesized value: {e}")))
}

/// Leaf synthesis by field-name pattern, then by scalar type
fn default_leaf(field_name: &str, base_type: &str) -> Value {
    use rand::Rng;
    match field_name.to_lowercase().as_str() {
        "id" => return Value::String(uuid::Uuid::new_v4().to_string()),
        "name" | "title" => {
            return Value::String(
                mockd_core::template::render_str("{{faker.name}}", &RenderContext::default()),
            )
        }
        "email" => {
            return Value::String(
                mockd_core::template::render_str("{{faker.email}}", &RenderContext::default()),
            )
        }
        "createdat" | "updatedat" | "timestamp" => {
            return Value::String(
                mockd_core::template::render_str("{{now}}", &RenderContext::default()),
            )
        }
        _ => {}
    }
    match base_type {
        "ID" => Value::String(uuid::Uuid::new_v4().to_string()),
        "Int" => Value::Number(rand::rng().random_range(0..100).into()),
        "Float" => serde_json::Number::from_f64(rand::rng().random_range(0.0..100.0))
            .map(Value::Number)
            .unwrap_or(Value::Null),
        "Boolean" => Value::Bool(rand::rng().random_bool(0.5)),
        _ => Value::String(mockd_core::template::render_str(
            "{{faker.word}}",
            &RenderContext::default(),
        )),
    }
}
