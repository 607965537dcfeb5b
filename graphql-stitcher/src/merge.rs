//! Merging subschemas into one schema.

use std::collections::HashMap;
use std::collections::HashSet;

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::Schema;
use apollo_compiler::ast::OperationType;
use apollo_compiler::collections::IndexMap;
use apollo_compiler::collections::IndexSet;
use apollo_compiler::name;
use apollo_compiler::schema::Component;
use apollo_compiler::schema::ComponentName;
use apollo_compiler::schema::ComponentOrigin;
use apollo_compiler::schema::DirectiveList;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::schema::ObjectType;

use crate::configuration::OnTypeConflict;
use crate::configuration::StitchOptions;
use crate::error::MergeError;
use crate::federation::spec::KEY_DIRECTIVE_NAME;
use crate::schema::EntityIndex;
use crate::schema::EntityOwner;
use crate::schema::FieldRoute;
use crate::schema::RootRoutes;
use crate::schema::UnifiedSchema;
use crate::subschema::SubschemaDescriptor;

/// Merges an ordered list of subschemas into a [`UnifiedSchema`].
///
/// The local schema is always the last entry, so that on any per-member
/// collision resolved by order the local definition wins.
pub trait Merge: Send + Sync + 'static {
    fn merge(
        &self,
        subschemas: &[SubschemaDescriptor],
        options: &StitchOptions,
    ) -> Result<UnifiedSchema, MergeError>;
}

/// The default [`Merge`] implementation.
///
/// Root fields of every subschema are gathered onto `Query` and `Mutation`
/// (after each subschema's transforms) and routed back to their owner; other
/// named types are combined according to [`OnTypeConflict`]; types carrying
/// `@key` are indexed as entities.
#[derive(Clone, Copy, Debug, Default)]
pub struct TypeMerger;

impl Merge for TypeMerger {
    fn merge(
        &self,
        subschemas: &[SubschemaDescriptor],
        options: &StitchOptions,
    ) -> Result<UnifiedSchema, MergeError> {
        let mut merging = Merging::new(options.on_type_conflict);
        for subschema in subschemas {
            merging.add(subschema)?;
        }
        merging.finish()
    }
}

fn unified_root_name(operation: OperationType) -> Name {
    match operation {
        OperationType::Query => name!("Query"),
        OperationType::Mutation => name!("Mutation"),
        OperationType::Subscription => name!("Subscription"),
    }
}

struct Merging {
    on_type_conflict: OnTypeConflict,
    schema: Schema,
    // first subschema to contribute each type, for error messages
    owners: HashMap<Name, String>,
    query: Option<ObjectType>,
    mutation: Option<ObjectType>,
    routes: RootRoutes,
    entities: EntityIndex,
}

impl Merging {
    fn new(on_type_conflict: OnTypeConflict) -> Self {
        Self {
            on_type_conflict,
            schema: Schema::new(),
            owners: HashMap::new(),
            query: None,
            mutation: None,
            routes: RootRoutes::default(),
            entities: EntityIndex::default(),
        }
    }

    fn add(&mut self, subschema: &SubschemaDescriptor) -> Result<(), MergeError> {
        tracing::debug!(subschema = %subschema.name, "merging subschema");
        let source = &subschema.schema;

        for (name, definition) in &source.directive_definitions {
            self.schema
                .directive_definitions
                .entry(name.clone())
                .or_insert_with(|| definition.clone());
        }

        self.add_root_fields(subschema)?;

        let root_types: HashSet<&Name> = [
            OperationType::Query,
            OperationType::Mutation,
            OperationType::Subscription,
        ]
        .into_iter()
        .filter_map(|operation| source.root_operation(operation))
        .collect();

        for (type_name, ty) in &source.types {
            if ty.is_built_in() || root_types.contains(type_name) {
                continue;
            }
            self.add_type(subschema, type_name, ty)?;
            self.index_entity(subschema, type_name, ty);
        }
        Ok(())
    }

    /// The subschema whose definition of a type is kept also owns its entities.
    fn index_entity(&mut self, subschema: &SubschemaDescriptor, type_name: &Name, ty: &ExtendedType) {
        let Some(keys) = entity_keys(ty) else {
            if self.on_type_conflict == OnTypeConflict::KeepLast {
                self.entities.0.shift_remove(type_name);
            }
            return;
        };
        if self.on_type_conflict == OnTypeConflict::KeepFirst
            && self.entities.0.contains_key(type_name)
        {
            return;
        }
        self.entities.0.insert(
            type_name.clone(),
            EntityOwner {
                subschema: subschema.id,
                subschema_name: subschema.name.clone(),
                keys,
                executor: subschema.executor.clone(),
            },
        );
    }

    fn add_root_fields(&mut self, subschema: &SubschemaDescriptor) -> Result<(), MergeError> {
        let source = &subschema.schema;
        for operation in [OperationType::Query, OperationType::Mutation] {
            let Some(root) = source
                .root_operation(operation)
                .and_then(|name| source.get_object(name))
            else {
                continue;
            };

            for (field_name, field) in &root.fields {
                let Some(exposed) = subschema.options.root_field_name(field_name) else {
                    continue;
                };
                let exposed = Name::new(&exposed).map_err(|_| MergeError::InvalidName {
                    name: exposed.clone(),
                    subschema: subschema.name.clone(),
                })?;

                let mut definition = field.node.as_ref().clone();
                definition.name = exposed.clone();
                let unified_root = match operation {
                    OperationType::Mutation => &mut self.mutation,
                    _ => &mut self.query,
                };
                unified_root
                    .get_or_insert_with(|| empty_object(unified_root_name(operation)))
                    .fields
                    .insert(exposed.clone(), Component::new(definition));

                if let Some(routes) = self.routes.for_operation_mut(operation) {
                    routes.insert(
                        exposed,
                        FieldRoute {
                            subschema: subschema.id,
                            subschema_name: subschema.name.clone(),
                            field: field_name.clone(),
                            executor: subschema.executor.clone(),
                        },
                    );
                }
            }
        }
        Ok(())
    }

    fn add_type(
        &mut self,
        subschema: &SubschemaDescriptor,
        type_name: &Name,
        incoming: &ExtendedType,
    ) -> Result<(), MergeError> {
        let Some(existing) = self.schema.types.get_mut(type_name) else {
            self.schema
                .types
                .insert(type_name.clone(), as_definition(incoming));
            self.owners
                .insert(type_name.clone(), subschema.name.clone());
            return Ok(());
        };

        if kind(existing) != kind(incoming) {
            return Err(MergeError::KindConflict {
                type_name: type_name.to_string(),
                existing: kind(existing),
                existing_owner: self.owners.get(type_name).cloned().unwrap_or_default(),
                incoming: kind(incoming),
                incoming_owner: subschema.name.clone(),
            });
        }

        match self.on_type_conflict {
            OnTypeConflict::KeepFirst => {}
            OnTypeConflict::KeepLast => *existing = as_definition(incoming),
            OnTypeConflict::Merge => {
                let repeatable: HashSet<Name> = self
                    .schema
                    .directive_definitions
                    .iter()
                    .filter(|(_, definition)| definition.repeatable)
                    .map(|(name, _)| name.clone())
                    .collect();
                merge_members(existing, incoming, &repeatable);
            }
        }
        Ok(())
    }

    fn finish(mut self) -> Result<UnifiedSchema, MergeError> {
        let Some(query) = self.query.take().filter(|query| !query.fields.is_empty()) else {
            return Err(MergeError::MissingQueryType);
        };
        let query_name = query.name.clone();
        self.schema
            .types
            .insert(query_name.clone(), ExtendedType::Object(Node::new(query)));
        self.schema.schema_definition.make_mut().query = Some(ComponentName::from(query_name));

        if let Some(mutation) = self.mutation.take() {
            let mutation_name = mutation.name.clone();
            self.schema
                .types
                .insert(mutation_name.clone(), ExtendedType::Object(Node::new(mutation)));
            self.schema.schema_definition.make_mut().mutation =
                Some(ComponentName::from(mutation_name));
        }

        let definitions = self
            .schema
            .validate()
            .map_err(|errors| MergeError::Invalid(errors.into()))?;
        tracing::debug!(
            types = definitions.types.len(),
            entities = self.entities.len(),
            "merged subschemas"
        );
        Ok(UnifiedSchema::new(definitions, self.routes, self.entities))
    }
}

fn empty_object(name: Name) -> ObjectType {
    ObjectType {
        description: None,
        name,
        directives: Default::default(),
        fields: IndexMap::default(),
        implements_interfaces: IndexSet::default(),
    }
}

fn kind(ty: &ExtendedType) -> &'static str {
    match ty {
        ExtendedType::Scalar(_) => "a scalar",
        ExtendedType::Object(_) => "an object type",
        ExtendedType::Interface(_) => "an interface",
        ExtendedType::Union(_) => "a union",
        ExtendedType::Enum(_) => "an enum",
        ExtendedType::InputObject(_) => "an input object",
    }
}

/// The `fields` of every `@key` on a type, or `None` when the type is not an entity.
fn entity_keys(ty: &ExtendedType) -> Option<Vec<String>> {
    let keys: Vec<String> = ty
        .directives()
        .get_all(KEY_DIRECTIVE_NAME)
        .filter_map(|key| key.specified_argument_by_name("fields")?.as_str())
        .map(str::to_string)
        .collect();
    (!keys.is_empty()).then_some(keys)
}

/// Clone a type, turning extension components into definition components since
/// the extensions they came from do not exist in the merged schema.
fn as_definition(ty: &ExtendedType) -> ExtendedType {
    let mut ty = ty.clone();
    match &mut ty {
        ExtendedType::Scalar(scalar) => {
            definition_directives(&mut scalar.make_mut().directives);
        }
        ExtendedType::Object(object) => {
            let object = object.make_mut();
            definition_directives(&mut object.directives);
            object.implements_interfaces = definition_names(&object.implements_interfaces);
            for field in object.fields.values_mut() {
                field.origin = ComponentOrigin::Definition;
            }
        }
        ExtendedType::Interface(interface) => {
            let interface = interface.make_mut();
            definition_directives(&mut interface.directives);
            interface.implements_interfaces = definition_names(&interface.implements_interfaces);
            for field in interface.fields.values_mut() {
                field.origin = ComponentOrigin::Definition;
            }
        }
        ExtendedType::Union(union_) => {
            let union_ = union_.make_mut();
            definition_directives(&mut union_.directives);
            union_.members = definition_names(&union_.members);
        }
        ExtendedType::Enum(enum_) => {
            let enum_ = enum_.make_mut();
            definition_directives(&mut enum_.directives);
            for value in enum_.values.values_mut() {
                value.origin = ComponentOrigin::Definition;
            }
        }
        ExtendedType::InputObject(input) => {
            let input = input.make_mut();
            definition_directives(&mut input.directives);
            for field in input.fields.values_mut() {
                field.origin = ComponentOrigin::Definition;
            }
        }
    }
    ty
}

fn definition_directives(directives: &mut DirectiveList) {
    for directive in directives.0.iter_mut() {
        directive.origin = ComponentOrigin::Definition;
    }
}

fn definition_names(names: &IndexSet<ComponentName>) -> IndexSet<ComponentName> {
    names
        .iter()
        .map(|name| {
            let mut name = name.clone();
            name.origin = ComponentOrigin::Definition;
            name
        })
        .collect()
}

/// Fold the members of `incoming` into `existing`, which has the same kind.
/// Members present in both take the incoming definition.
fn merge_members(existing: &mut ExtendedType, incoming: &ExtendedType, repeatable: &HashSet<Name>) {
    let incoming = as_definition(incoming);
    match (existing, &incoming) {
        (ExtendedType::Scalar(existing), ExtendedType::Scalar(incoming)) => {
            let existing = existing.make_mut();
            merge_description(&mut existing.description, &incoming.description);
            merge_directives(&mut existing.directives, &incoming.directives, repeatable);
        }
        (ExtendedType::Object(existing), ExtendedType::Object(incoming)) => {
            let existing = existing.make_mut();
            merge_description(&mut existing.description, &incoming.description);
            merge_directives(&mut existing.directives, &incoming.directives, repeatable);
            existing
                .implements_interfaces
                .extend(incoming.implements_interfaces.iter().cloned());
            existing
                .fields
                .extend(incoming.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        (ExtendedType::Interface(existing), ExtendedType::Interface(incoming)) => {
            let existing = existing.make_mut();
            merge_description(&mut existing.description, &incoming.description);
            merge_directives(&mut existing.directives, &incoming.directives, repeatable);
            existing
                .implements_interfaces
                .extend(incoming.implements_interfaces.iter().cloned());
            existing
                .fields
                .extend(incoming.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        (ExtendedType::Union(existing), ExtendedType::Union(incoming)) => {
            let existing = existing.make_mut();
            merge_description(&mut existing.description, &incoming.description);
            merge_directives(&mut existing.directives, &incoming.directives, repeatable);
            existing.members.extend(incoming.members.iter().cloned());
        }
        (ExtendedType::Enum(existing), ExtendedType::Enum(incoming)) => {
            let existing = existing.make_mut();
            merge_description(&mut existing.description, &incoming.description);
            merge_directives(&mut existing.directives, &incoming.directives, repeatable);
            existing
                .values
                .extend(incoming.values.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        (ExtendedType::InputObject(existing), ExtendedType::InputObject(incoming)) => {
            let existing = existing.make_mut();
            merge_description(&mut existing.description, &incoming.description);
            merge_directives(&mut existing.directives, &incoming.directives, repeatable);
            existing
                .fields
                .extend(incoming.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        // kinds are checked by the caller
        _ => {}
    }
}

fn merge_description<T: Clone>(existing: &mut Option<T>, incoming: &Option<T>) {
    if incoming.is_some() {
        existing.clone_from(incoming);
    }
}

/// Non-repeatable directives are replaced by the incoming application;
/// repeatable ones accumulate distinct applications.
fn merge_directives(existing: &mut DirectiveList, incoming: &DirectiveList, repeatable: &HashSet<Name>) {
    for directive in incoming.0.iter() {
        if repeatable.contains(&directive.name) {
            if !existing.0.iter().any(|present| present.node == directive.node) {
                existing.0.push(directive.clone());
            }
        } else if let Some(present) = existing
            .0
            .iter_mut()
            .find(|present| present.name == directive.name)
        {
            *present = directive.clone();
        } else {
            existing.0.push(directive.clone());
        }
    }
}
