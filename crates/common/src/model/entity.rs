// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use crate::model::ModelError;
use crate::model::acls::Acls;
use crate::model::compiled::CompiledJson;
use crate::model::identity::Identity;
use crate::model::keys::{EntityClass, EntityKey, EntityRef};
use crate::model::props::{Kind, Props};
use crate::model::scope::{Scope, ScopeGuard};
use crate::model::version::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The unit of persistence: identity, common properties and a bag of named scopes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub key: EntityKey,
    #[serde(default)]
    pub version: Version,
    pub klass: EntityClass,
    #[serde(default)]
    pub creator: Option<EntityRef>,
    #[serde(default)]
    pub parent: Option<EntityRef>,
    pub identity: Identity,
    #[serde(default)]
    pub acls: Acls,
    pub props: Props,
    #[serde(default)]
    pub scopes: BTreeMap<String, Value>,
}

impl Entity {
    pub fn from_json(value: &Value) -> Result<Self, ModelError> {
        Self::deserialize(value).map_err(|e| ModelError::MalformedJson(e.to_string()))
    }

    pub fn serialize(&self) -> Result<CompiledJson, ModelError> {
        let value = serde_json::to_value(self).map_err(|e| ModelError::Serialization {
            key: self.key.clone(),
            message: e.to_string(),
        })?;
        CompiledJson::from_value(value)
    }

    pub fn to_ref(&self) -> EntityRef {
        EntityRef::new(self.key.clone(), self.klass, self.props.name.clone())
    }

    pub fn name(&self) -> &str {
        &self.props.name
    }

    pub fn gid(&self) -> Option<u64> {
        self.props.gid
    }

    pub fn touch(&mut self) {
        self.version.touch();
        self.props.touched = chrono::Utc::now().timestamp_millis();
    }

    pub fn is_dirty(&self) -> bool {
        self.version.is_dirty()
    }

    pub fn has<S: Scope>(&self) -> bool {
        self.scopes.contains_key(S::NAME)
    }

    /// A detached copy of a scope. Nothing is written back.
    pub fn scope<S: Scope>(&self) -> Result<S, ModelError> {
        match self.scopes.get(S::NAME) {
            Some(value) => S::deserialize(value).map_err(|e| ModelError::ScopeDecode {
                key: self.key.clone(),
                scope: S::NAME.to_string(),
                message: e.to_string(),
            }),
            None => Ok(S::default()),
        }
    }

    /// Check out a scope for modification.
    pub fn make<S: Scope>(&mut self) -> Result<ScopeGuard<'_, S>, ModelError> {
        let data = self.scope::<S>()?;
        Ok(ScopeGuard::new(self, data))
    }

    /// Check out a scope, applying `overrides` to the stored (or default) data first.
    pub fn make_with<S: Scope>(
        &mut self,
        overrides: impl FnOnce(&mut S),
    ) -> Result<ScopeGuard<'_, S>, ModelError> {
        let mut data = self.scope::<S>()?;
        overrides(&mut data);
        Ok(ScopeGuard::new(self, data))
    }

    /// Store scope data, touching the entity only if it changed. Returns whether it did.
    pub fn checkin<S: Scope>(&mut self, data: &S) -> Result<bool, ModelError> {
        let encode = |d: &S| {
            serde_json::to_value(d).map_err(|e| ModelError::Serialization {
                key: self.key.clone(),
                message: e.to_string(),
            })
        };
        let value = encode(data)?;
        match self.scopes.get(S::NAME) {
            Some(existing) if *existing == value => return Ok(false),
            None if value == encode(&S::default())? => return Ok(false),
            _ => {}
        }
        self.scopes.insert(S::NAME.to_string(), value);
        self.touch();
        Ok(true)
    }

    /// The kind this entity mints under `name`, created on first use and signed by this entity.
    pub fn get_kind(&mut self, name: &str) -> Result<Kind, ModelError> {
        if let Some(kind) = self.props.related.get(name) {
            return Ok(kind.clone());
        }
        let kind = Kind::new(Identity::generate_signed_by(&self.identity)?.public_only());
        self.props.related.insert(name.to_string(), kind.clone());
        self.touch();
        Ok(kind)
    }

    pub fn can_modify(&self) -> bool {
        self.props.frozen.is_none()
    }

    pub fn try_modify(&self) -> Result<(), ModelError> {
        if self.can_modify() {
            Ok(())
        } else {
            Err(ModelError::EntityFrozen(self.key.clone()))
        }
    }

    pub fn freeze(&mut self, identity: &Identity) -> Result<bool, ModelError> {
        self.try_modify()?;
        self.props.frozen = Some(identity.public_only());
        self.touch();
        Ok(true)
    }

    /// Only the identity that froze an entity may unfreeze it.
    pub fn unfreeze(&mut self, identity: &Identity) -> Result<bool, ModelError> {
        let Some(frozen) = &self.props.frozen else {
            return Err(ModelError::EntityUnfrozen(self.key.clone()));
        };
        if frozen.public != identity.public {
            return Ok(false);
        }
        self.props.frozen = None;
        self.touch();
        Ok(true)
    }

    pub fn destroy(&mut self) {
        self.props.destroyed = Some(self.identity.public_only());
        self.touch();
    }

    pub fn is_destroyed(&self) -> bool {
        self.props.destroyed.is_some()
    }

    pub fn describe(&self) -> String {
        match self.props.gid {
            Some(gid) => format!("{} (#{gid})", self.props.name),
            None => self.props.name.clone(),
        }
    }

    /// Entities other than the world must have a creator.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.klass != EntityClass::World && self.creator.is_none() {
            return Err(ModelError::MissingCreator(self.key.clone()));
        }
        Ok(())
    }

    /// Dispatch on class, for renderers.
    pub fn accept<V: EntityVisitor + ?Sized>(&self, visitor: &mut V) {
        match self.klass {
            EntityClass::Area => visitor.visit_area(self),
            EntityClass::Item => visitor.visit_item(self),
            EntityClass::Living => visitor.visit_living(self),
            _ => visitor.visit_entity(self),
        }
    }

    pub(crate) fn assign_gid(&mut self, gid: u64) {
        self.props.gid = Some(gid);
        self.touch();
    }
}

/// Every class-specific visit falls back to [`EntityVisitor::visit_entity`].
pub trait EntityVisitor {
    fn visit_entity(&mut self, _entity: &Entity) {}

    fn visit_area(&mut self, entity: &Entity) {
        self.visit_entity(entity)
    }

    fn visit_item(&mut self, entity: &Entity) {
        self.visit_entity(entity)
    }

    fn visit_living(&mut self, entity: &Entity) {
        self.visit_entity(entity)
    }
}

/// Builds new entities. A creator's identity signs the new identity.
pub struct EntityBuilder {
    key: Option<EntityKey>,
    klass: EntityClass,
    props: Props,
    creator: Option<(EntityRef, Identity)>,
    parent: Option<EntityRef>,
    acls: Acls,
    scopes: BTreeMap<String, Value>,
    error: Option<ModelError>,
}

impl EntityBuilder {
    pub fn new(klass: EntityClass, name: impl Into<String>) -> Self {
        Self {
            key: None,
            klass,
            props: Props::named(name),
            creator: None,
            parent: None,
            acls: Acls::owner_writes(),
            scopes: BTreeMap::new(),
            error: None,
        }
    }

    pub fn key(mut self, key: EntityKey) -> Self {
        self.key = Some(key);
        self
    }

    pub fn desc(mut self, desc: impl Into<String>) -> Self {
        self.props.desc = desc.into();
        self
    }

    pub fn creator(mut self, creator: &Entity) -> Self {
        self.creator = Some((creator.to_ref(), creator.identity.clone()));
        self
    }

    pub fn parent(mut self, parent: &Entity) -> Self {
        self.parent = Some(parent.to_ref());
        self
    }

    pub fn acls(mut self, acls: Acls) -> Self {
        self.acls = acls;
        self
    }

    pub fn prop(mut self, name: &str, value: Value) -> Self {
        self.props.set(name, value);
        self
    }

    pub fn with_scope<S: Scope>(mut self, scope: S) -> Self {
        match serde_json::to_value(&scope) {
            Ok(value) => {
                self.scopes.insert(S::NAME.to_string(), value);
            }
            Err(e) => {
                self.error.get_or_insert(ModelError::MalformedJson(e.to_string()));
            }
        }
        self
    }

    pub fn build(self) -> Result<Entity, ModelError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let identity = match &self.creator {
            Some((_, creator)) => Identity::generate_signed_by(creator)?,
            None => Identity::generate(),
        };
        let mut entity = Entity {
            key: self.key.unwrap_or_else(EntityKey::generate),
            version: Version::default(),
            klass: self.klass,
            creator: self.creator.map(|(r, _)| r),
            parent: self.parent,
            identity,
            acls: self.acls,
            props: self.props,
            scopes: self.scopes,
        };
        entity.validate()?;
        entity.touch();
        Ok(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        count: u32,
    }

    impl Scope for Counter {
        const NAME: &'static str = "counter";
    }

    fn world() -> Entity {
        EntityBuilder::new(EntityClass::World, "World")
            .key("world".into())
            .build()
            .unwrap()
    }

    fn thing(world: &Entity) -> Entity {
        let mut e = EntityBuilder::new(EntityClass::Item, "Thing")
            .creator(world)
            .build()
            .unwrap();
        e.version.clean();
        e
    }

    #[test]
    fn test_scope_checkout_marks_dirty() {
        let world = world();
        let mut e = thing(&world);
        {
            let mut counter = e.make::<Counter>().unwrap();
            counter.count += 1;
        }
        assert!(e.is_dirty());
        assert_eq!(e.scope::<Counter>().unwrap().count, 1);
    }

    #[test]
    fn test_unchanged_checkout_stays_clean() {
        let world = world();
        let mut e = thing(&world);
        {
            let _counter = e.make::<Counter>().unwrap();
        }
        assert!(!e.is_dirty());
        assert!(!e.has::<Counter>());
    }

    #[test]
    fn test_discard_and_reenter() {
        let world = world();
        let mut e = thing(&world);
        {
            let mut counter = e.make::<Counter>().unwrap();
            counter.count = 5;
            counter.discard();
        }
        assert!(!e.is_dirty());

        {
            let mut counter = e.make::<Counter>().unwrap();
            {
                let mut inner = counter.reenter();
                inner.count = 2;
            }
            assert_eq!(counter.depth(), 0);
            counter.count += 1;
        }
        assert_eq!(e.scope::<Counter>().unwrap().count, 3);
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Pairs {
        pairs: std::collections::BTreeMap<(u8, u8), u8>,
    }

    impl Scope for Pairs {
        const NAME: &'static str = "pairs";
    }

    #[test]
    fn test_commit_reports_changes() {
        let world = world();
        let mut e = thing(&world);
        let mut counter = e.make::<Counter>().unwrap();
        counter.count = 4;
        assert!(counter.commit().unwrap());
        assert!(e.is_dirty());
        assert!(!e.make::<Counter>().unwrap().commit().unwrap());
        assert_eq!(e.scope::<Counter>().unwrap().count, 4);
    }

    #[test]
    fn test_commit_surfaces_encoding_failures() {
        let world = world();
        let mut e = thing(&world);
        let mut pairs = e.make::<Pairs>().unwrap();
        pairs.pairs.insert((1, 2), 3);
        assert!(matches!(
            pairs.commit(),
            Err(ModelError::Serialization { .. })
        ));
        assert!(!e.is_dirty());
        assert!(!e.has::<Pairs>());
    }

    #[test]
    fn test_frozen() {
        let world = world();
        let mut e = thing(&world);
        let a = Identity::generate();
        let b = Identity::generate();
        assert!(e.freeze(&a).unwrap());
        assert!(matches!(e.try_modify(), Err(ModelError::EntityFrozen(_))));
        assert!(matches!(e.freeze(&b), Err(ModelError::EntityFrozen(_))));
        assert!(!e.unfreeze(&b).unwrap());
        assert!(e.unfreeze(&a).unwrap());
        assert!(e.try_modify().is_ok());
        assert!(matches!(e.unfreeze(&a), Err(ModelError::EntityUnfrozen(_))));
    }

    #[test]
    fn test_round_trip_is_byte_identical() {
        let world = world();
        let mut e = thing(&world);
        e.make::<Counter>().unwrap().count = 7;
        e.props.set("gold", serde_json::json!(1.5));
        let first = e.serialize().unwrap();
        let back = Entity::from_json(&first.compiled).unwrap();
        let second = back.serialize().unwrap();
        assert_eq!(first.text, second.text);
    }

    #[test]
    fn test_non_world_requires_creator() {
        let result = EntityBuilder::new(EntityClass::Item, "Orphan").build();
        assert!(matches!(result, Err(ModelError::MissingCreator(_))));
    }

    #[test]
    fn test_kind_is_stable() {
        let world = world();
        let mut e = thing(&world);
        let a = e.get_kind("coin").unwrap();
        let b = e.get_kind("coin").unwrap();
        assert!(a.same(&b));
        assert!(!a.same(&e.get_kind("gem").unwrap()));
    }

    #[derive(Default)]
    struct Classes(Vec<&'static str>);

    impl EntityVisitor for Classes {
        fn visit_entity(&mut self, _entity: &Entity) {
            self.0.push("other");
        }

        fn visit_item(&mut self, _entity: &Entity) {
            self.0.push("item");
        }
    }

    #[test]
    fn test_accept_dispatches_on_class() {
        let world = world();
        let mut classes = Classes::default();
        world.accept(&mut classes);
        thing(&world).accept(&mut classes);
        assert_eq!(classes.0, vec!["other", "item"]);
    }
}
