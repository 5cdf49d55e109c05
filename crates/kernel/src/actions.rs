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

//! Reference actions: just enough verbs to move things around a world, stack them, wear them
//! and freeze them. Richer verbs belong to hosts or to scripted behaviors.

use crate::bus::Event;
use crate::ctx::Ctx;
use crate::dynamic::{Behavior, DynamicAction};
use crate::errors::SessionError;
use crate::session::Session;
use crate::tools::{self, Relation};
use dimsum_common::model::{
    Entity, EntityBuilder, EntityClass, EntityKey, EntityVisitor, ModelError,
};
use dimsum_common::scopes::{
    Apparel, Carryable, Containing, Location, Occupyable, Ownership, Wearable,
};
use serde_json::json;
use std::fmt::{Display, Formatter};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Look,
    Hold { item: String },
    /// `None` drops everything held.
    Drop { item: Option<String> },
    Create { name: String },
    Wear { item: String },
    Remove { item: String },
    Freeze { item: String },
    Unfreeze { item: String },
    Dynamic(DynamicAction),
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observation {
    pub area: String,
    pub items: Vec<String>,
    pub people: Vec<String>,
    pub holding: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Success(String),
    Failure(String),
    Observation(Observation),
    /// A script faulted. The fault has been logged against `entity` and the session must be
    /// discarded.
    DynamicFailure { entity: EntityKey, message: String },
}

impl Display for Reply {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Reply::Success(message) | Reply::Failure(message) => f.write_str(message),
            Reply::Observation(o) => {
                write!(f, "You're in {}.", o.area)?;
                if !o.people.is_empty() {
                    write!(f, "\nAlso here: {}.", o.people.join(", "))?;
                }
                if !o.items.is_empty() {
                    write!(f, "\nYou see: {}.", o.items.join(", "))?;
                }
                if !o.holding.is_empty() {
                    write!(f, "\nYou're holding: {}.", o.holding.join(", "))?;
                }
                Ok(())
            }
            Reply::DynamicFailure { entity, message } => {
                write!(f, "Something went wrong with {entity}: {message}")
            }
        }
    }
}

/// Name plus quantity, for items stacked more than one high.
fn label(entity: &Entity) -> String {
    match entity.scope::<Carryable>() {
        Ok(c) if c.quantity != 1.0 => format!("{} ({})", entity.describe(), c.quantity),
        _ => entity.describe(),
    }
}

fn person_of(ctx: &Ctx) -> Result<EntityKey, SessionError> {
    ctx.person
        .clone()
        .ok_or_else(|| SessionError::MissingEntity("acting person".to_string()))
}

fn area_of(session: &Session, person: &EntityKey) -> Result<EntityKey, SessionError> {
    tools::area_of(session.get(person)?)
        .ok_or_else(|| SessionError::MissingEntity(format!("area of {person}")))
}

/// Run `name` hooks for `subject`, applying their effects. A veto becomes the failure reply.
fn vetoed(
    session: &mut Session,
    ctx: &mut Ctx,
    behavior: &mut Behavior,
    name: &str,
    subject: &EntityKey,
) -> Result<Option<Reply>, SessionError> {
    let (veto, effects) = behavior.hook(name, session.registrar(), session.get(subject)?)?;
    session.apply(effects, ctx)?;
    Ok(veto.map(Reply::Failure))
}

impl Action {
    pub(crate) fn perform(
        &self,
        session: &mut Session,
        ctx: &mut Ctx,
        behavior: &mut Behavior,
    ) -> Result<Reply, SessionError> {
        debug!(action = ?self, "performing");
        match self {
            Action::Look => look(session, ctx),
            Action::Hold { item } => hold(session, ctx, behavior, item),
            Action::Drop { item } => drop(session, ctx, behavior, item.as_deref()),
            Action::Create { name } => create(session, ctx, name),
            Action::Wear { item } => wear(session, ctx, behavior, item),
            Action::Remove { item } => remove(session, ctx, behavior, item),
            Action::Freeze { item } => freeze(session, ctx, item, true),
            Action::Unfreeze { item } => freeze(session, ctx, item, false),
            Action::Dynamic(action) => {
                let (reply, effects) = behavior.perform(action, session.registrar(), &ctx.entities)?;
                session.apply(effects, ctx)?;
                Ok(reply)
            }
            Action::Unknown => Ok(Reply::Failure("Sorry, I don't understand.".to_string())),
        }
    }
}

/// Sorts what the person can see into an [`Observation`].
struct Observer<'a> {
    observing: &'a EntityKey,
    observation: Observation,
}

impl EntityVisitor for Observer<'_> {
    fn visit_entity(&mut self, entity: &Entity) {
        self.observation.items.push(label(entity));
    }

    fn visit_area(&mut self, entity: &Entity) {
        self.observation.area = entity.describe();
    }

    fn visit_living(&mut self, entity: &Entity) {
        if entity.key != *self.observing {
            self.observation.people.push(entity.describe());
        }
    }
}

fn look(session: &mut Session, ctx: &mut Ctx) -> Result<Reply, SessionError> {
    let person = person_of(ctx)?;
    let registrar = session.registrar();
    let area = session.get(&area_of(session, &person)?)?;

    let mut observer = Observer {
        observing: &person,
        observation: Observation::default(),
    };
    area.accept(&mut observer);
    let occupants = area.scope::<Occupyable>()?.occupied;
    for seen in occupants.into_iter().chain(tools::holding(area)) {
        match registrar.find_by_key(&seen.key) {
            Some(entity) => entity.accept(&mut observer),
            None if seen.key == person => {}
            // Beyond reach. The reference still knows what it points at.
            None if seen.klass == EntityClass::Living => observer.observation.people.push(seen.name),
            None => observer.observation.items.push(seen.name),
        }
    }

    let holding = tools::holding(session.get(&person)?)
        .into_iter()
        .map(|held| registrar.find_by_key(&held.key).map(label).unwrap_or(held.name))
        .collect();
    let mut observation = observer.observation;
    observation.holding = holding;
    Ok(Reply::Observation(observation))
}

fn hold(
    session: &mut Session,
    ctx: &mut Ctx,
    behavior: &mut Behavior,
    q: &str,
) -> Result<Reply, SessionError> {
    let person = person_of(ctx)?;
    let area = area_of(session, &person)?;
    let Some(item) = tools::find(session.registrar(), ctx.entities.with(Relation::Ground), q)
        .map(|e| e.key.clone())
    else {
        return Ok(Reply::Failure(format!("There's no {q} here.")));
    };
    if let Some(veto) = vetoed(session, ctx, behavior, "hold", &item)? {
        return Ok(veto);
    }

    let carrying = session.get(&item)?.scope::<Carryable>()?;
    let stack = tools::holding(session.get(&person)?)
        .iter()
        .filter_map(|r| session.registrar().find_by_key(&r.key))
        .find(|held| {
            held.key != item
                && held
                    .scope::<Carryable>()
                    .is_ok_and(|c| c.same_kind(&carrying))
        })
        .map(|held| held.key.clone());

    // Nothing changes unless everything involved can.
    for key in [&person, &area, &item].into_iter().chain(stack.as_ref()) {
        session.get(key)?.try_modify()?;
    }
    if stack.is_none() && session.get(&person)?.scope::<Containing>()?.is_full() {
        return Ok(Reply::Failure("Your hands are full.".to_string()));
    }

    session.get_mut(&area)?.make::<Containing>()?.drop_item(&item);
    let reply = match stack {
        Some(stack) => {
            let total = {
                let stack = session.get_mut(&stack)?;
                let mut carryable = stack.make::<Carryable>()?;
                carryable.quantity += carrying.quantity;
                carryable.quantity
            };
            session.unregister(&item)?;
            ctx.raise(
                Event::new("held", json!({ "item": stack, "merged": item, "quantity": total }))
                    .from(&person),
            );
            let name = session.get(&stack)?.name().to_string();
            Reply::Success(format!("You're now holding {total} {name}."))
        }
        None => {
            let item_ref = session.get(&item)?.to_ref();
            let person_ref = session.get(&person)?.to_ref();
            session
                .get_mut(&person)?
                .make::<Containing>()?
                .hold(item_ref.clone());
            session.get_mut(&item)?.make::<Location>()?.container = Some(person_ref);
            ctx.raise(Event::new("held", json!({ "item": item })).from(&person));
            Reply::Success(format!("You're holding {}.", item_ref.name))
        }
    };
    Ok(reply)
}

fn drop(
    session: &mut Session,
    ctx: &mut Ctx,
    behavior: &mut Behavior,
    q: Option<&str>,
) -> Result<Reply, SessionError> {
    let person = person_of(ctx)?;
    let area = area_of(session, &person)?;
    let items: Vec<EntityKey> = match q {
        Some(q) => match tools::find(session.registrar(), ctx.entities.with(Relation::Held), q) {
            Some(item) => vec![item.key.clone()],
            None => return Ok(Reply::Failure(format!("You're not holding {q}."))),
        },
        None => ctx.entities.with(Relation::Held).cloned().collect(),
    };
    if items.is_empty() {
        return Ok(Reply::Failure("You're not holding anything.".to_string()));
    }
    for item in &items {
        if let Some(veto) = vetoed(session, ctx, behavior, "drop", item)? {
            return Ok(veto);
        }
    }
    for key in [&person, &area].into_iter().chain(&items) {
        session.get(key)?.try_modify()?;
    }

    let area_ref = session.get(&area)?.to_ref();
    let mut names = vec![];
    for item in &items {
        let item_ref = session.get(item)?.to_ref();
        session.get_mut(&person)?.make::<Containing>()?.drop_item(item);
        session
            .get_mut(&area)?
            .make::<Containing>()?
            .hold(item_ref.clone());
        session.get_mut(item)?.make::<Location>()?.container = Some(area_ref.clone());
        ctx.raise(Event::new("dropped", json!({ "item": item, "area": area })).from(&person));
        names.push(item_ref.name);
    }
    Ok(Reply::Success(format!("You dropped {}.", names.join(", "))))
}

fn wear(
    session: &mut Session,
    ctx: &mut Ctx,
    behavior: &mut Behavior,
    q: &str,
) -> Result<Reply, SessionError> {
    let person = person_of(ctx)?;
    let Some(item) = tools::find(session.registrar(), ctx.entities.with(Relation::Held), q)
        .map(|e| e.key.clone())
    else {
        return Ok(Reply::Failure(format!("You're not holding {q}.")));
    };
    if !session.get(&item)?.scope::<Wearable>()?.wearable {
        return Ok(Reply::Failure("You can't wear that.".to_string()));
    }
    if let Some(veto) = vetoed(session, ctx, behavior, "wear", &item)? {
        return Ok(veto);
    }
    for key in [&person, &item] {
        session.get(key)?.try_modify()?;
    }

    let item_ref = session.get(&item)?.to_ref();
    let wearer = session.get_mut(&person)?;
    wearer.make::<Containing>()?.drop_item(&item);
    let mut apparel = wearer.make::<Apparel>()?;
    apparel.wear(item_ref.clone());
    apparel.commit()?;
    ctx.raise(Event::new("worn", json!({ "item": item })).from(&person));
    Ok(Reply::Success(format!("You're wearing {}.", item_ref.name)))
}

fn remove(
    session: &mut Session,
    ctx: &mut Ctx,
    behavior: &mut Behavior,
    q: &str,
) -> Result<Reply, SessionError> {
    let person = person_of(ctx)?;
    let Some(item) = tools::find(session.registrar(), ctx.entities.with(Relation::Wearing), q)
        .map(|e| e.key.clone())
    else {
        return Ok(Reply::Failure(format!("You aren't wearing {q}.")));
    };
    if let Some(veto) = vetoed(session, ctx, behavior, "remove", &item)? {
        return Ok(veto);
    }
    for key in [&person, &item] {
        session.get(key)?.try_modify()?;
    }

    let item_ref = session.get(&item)?.to_ref();
    let wearer = session.get_mut(&person)?;
    let mut apparel = wearer.make::<Apparel>()?;
    apparel.unwear(&item);
    apparel.commit()?;
    wearer.make::<Containing>()?.hold(item_ref.clone());
    ctx.raise(Event::new("removed", json!({ "item": item })).from(&person));
    Ok(Reply::Success(format!("You took off {}.", item_ref.name)))
}

fn create(session: &mut Session, ctx: &mut Ctx, name: &str) -> Result<Reply, SessionError> {
    let person = person_of(ctx)?;
    let creator = session.get_mut(&person)?;
    creator.try_modify()?;
    let kind = creator.get_kind(name)?;
    let item = EntityBuilder::new(EntityClass::Item, name)
        .creator(creator)
        .with_scope(Carryable {
            kind: Some(kind),
            quantity: 1.0,
        })
        .with_scope(Ownership {
            owner: Some(creator.to_ref()),
        })
        .with_scope(Location {
            container: Some(creator.to_ref()),
            ..Default::default()
        })
        .build()?;
    let item = session.register(item)?.to_ref();
    session
        .get_mut(&person)?
        .make::<Containing>()?
        .hold(item.clone());
    ctx.raise(Event::new("created", json!({ "item": item.key })).from(&person));
    Ok(Reply::Success(format!("You're holding a new {}.", item.name)))
}

fn freeze(
    session: &mut Session,
    ctx: &mut Ctx,
    q: &str,
    freezing: bool,
) -> Result<Reply, SessionError> {
    let person = person_of(ctx)?;
    let identity = session.get(&person)?.identity.clone();
    let nearby = ctx
        .entities
        .with(Relation::Held)
        .chain(ctx.entities.with(Relation::Ground))
        .chain(ctx.entities.with(Relation::Area));
    let Some(target) = tools::find(session.registrar(), nearby, q).map(|e| e.key.clone()) else {
        return Ok(Reply::Failure(format!("There's no {q} here.")));
    };
    let entity = session.get_mut(&target)?;
    if freezing {
        entity.freeze(&identity)?;
        ctx.raise(Event::new("frozen", json!({ "item": target })).from(&person));
        return Ok(Reply::Success(format!("You froze {}.", entity.describe())));
    }
    match entity.unfreeze(&identity) {
        Ok(true) => {
            ctx.raise(Event::new("unfrozen", json!({ "item": target })).from(&person));
            Ok(Reply::Success(format!("You unfroze {}.", entity.describe())))
        }
        Ok(false) => Ok(Reply::Failure(
            "Only whoever froze it can unfreeze it.".to_string(),
        )),
        Err(ModelError::EntityUnfrozen(_)) => Ok(Reply::Failure("It isn't frozen.".to_string())),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_display() {
        let reply = Reply::Observation(Observation {
            area: "Lobby (#2)".to_string(),
            items: vec!["Box (#4)".to_string()],
            people: vec![],
            holding: vec!["Coin (#5) (3)".to_string()],
        });
        assert_eq!(
            reply.to_string(),
            "You're in Lobby (#2).\nYou see: Box (#4).\nYou're holding: Coin (#5) (3)."
        );
    }
}
