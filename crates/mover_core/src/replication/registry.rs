//! Wire type registry and group codecs
//!
//! Every replicated item is written as `family tag (u8) | wire id (u16) |
//! payload (u32 length + MessagePack)`. Arrays carry a `u8` count, active
//! items first. Decoding fails closed: an unknown family tag, a tag from
//! another family, or an unknown id aborts the whole array.

use std::any::{self, Any};
use std::fmt;

use fxhash::FxHashMap;
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::data::{CharacterDefaultInputs, MoverDataCollection, MoverDataStruct, MoverSyncState, UpdatedMotionState};
use crate::error::{ReplicationError, TypeFamily};
use crate::instant_effects::{
    ApplyVelocityEffect, InstantMovementEffect, JumpImpulseEffect, ScheduledInstantMovementEffect, TeleportEffect,
};
use crate::layered_moves::{
    JumpImpulseMove, JumpToMove, LaunchMove, LaunchMoveData, LayeredMove, LayeredMoveGroup, LayeredMoveInstance,
    LayeredMoveInstanceGroup, LayeredMoveInstancedData, LinearVelocityMove, MoveToMove, RadialImpulseMove,
};
use crate::modifiers::{MovementModifier, MovementModifierGroup, StanceModifier};
use crate::replication::archive::{NetReader, NetWriter};

type Result<T> = std::result::Result<T, ReplicationError>;

type EncodeFn = fn(&dyn Any, TypeFamily) -> Result<Vec<u8>>;

static SHARED: Lazy<ReplicationRegistry> = Lazy::new(ReplicationRegistry::with_defaults);

fn encode_payload<T: Serialize + 'static>(item: &dyn Any, family: TypeFamily) -> Result<Vec<u8>> {
    let value = item.downcast_ref::<T>().ok_or_else(|| ReplicationError::UnregisteredType {
        family,
        type_name: any::type_name::<T>().to_string(),
    })?;
    Ok(rmp_serde::to_vec_named(value)?)
}

fn decode_layered_move<T: LayeredMove + Clone + DeserializeOwned>(bytes: &[u8]) -> Result<Box<dyn LayeredMove>> {
    Ok(Box::new(rmp_serde::from_slice::<T>(bytes)?))
}

fn decode_move_data<T: LayeredMoveInstancedData + Clone + DeserializeOwned>(
    bytes: &[u8],
) -> Result<Box<dyn LayeredMoveInstancedData>> {
    Ok(Box::new(rmp_serde::from_slice::<T>(bytes)?))
}

fn decode_modifier<T: MovementModifier + Clone + DeserializeOwned>(bytes: &[u8]) -> Result<Box<dyn MovementModifier>> {
    Ok(Box::new(rmp_serde::from_slice::<T>(bytes)?))
}

fn decode_effect<T: InstantMovementEffect + Clone + DeserializeOwned>(
    bytes: &[u8],
) -> Result<Box<dyn InstantMovementEffect>> {
    Ok(Box::new(rmp_serde::from_slice::<T>(bytes)?))
}

fn decode_data_struct<T: MoverDataStruct + Clone + DeserializeOwned>(bytes: &[u8]) -> Result<Box<dyn MoverDataStruct>> {
    Ok(Box::new(rmp_serde::from_slice::<T>(bytes)?))
}

struct WireType<B: ?Sized> {
    type_name: &'static str,
    encode: EncodeFn,
    decode: fn(&[u8]) -> Result<Box<B>>,
}

/// Allow-list for one polymorphic base.
struct FamilyTable<B: ?Sized> {
    family: TypeFamily,
    types: Vec<WireType<B>>,
    ids: FxHashMap<&'static str, u16>,
}

impl<B: ?Sized> fmt::Debug for FamilyTable<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FamilyTable")
            .field("family", &self.family)
            .field("types", &self.types.iter().map(|t| t.type_name).collect::<Vec<_>>())
            .finish()
    }
}

impl<B: ?Sized> FamilyTable<B> {
    fn new(family: TypeFamily) -> Self {
        Self { family, types: Vec::new(), ids: FxHashMap::default() }
    }

    fn register(
        &mut self,
        type_name: &'static str,
        encode: EncodeFn,
        decode: fn(&[u8]) -> Result<Box<B>>,
    ) -> Result<u16> {
        if self.ids.contains_key(type_name) {
            return Err(ReplicationError::DuplicateType { family: self.family, type_name: type_name.to_string() });
        }
        let id = u16::try_from(self.types.len())
            .map_err(|_| ReplicationError::PayloadTooLarge(self.types.len()))?;
        self.types.push(WireType { type_name, encode, decode });
        self.ids.insert(type_name, id);
        debug!("Registered {} {} as wire id {}", self.family, type_name, id);
        Ok(id)
    }

    fn id_of(&self, type_name: &str) -> Option<u16> {
        self.ids.get(type_name).copied()
    }

    fn write_item(&self, w: &mut NetWriter, type_name: &'static str, item: &dyn Any) -> Result<()> {
        let id = self.id_of(type_name).ok_or_else(|| ReplicationError::UnregisteredType {
            family: self.family,
            type_name: type_name.to_string(),
        })?;
        let payload = (self.types[usize::from(id)].encode)(item, self.family)?;
        w.write_u8(self.family.wire_tag());
        w.write_u16(id);
        w.write_bytes(&payload)
    }

    fn read_item(&self, r: &mut NetReader<'_>) -> Result<Box<B>> {
        let tag = r.read_u8()?;
        let found = TypeFamily::from_wire_tag(tag).ok_or(ReplicationError::UnknownFamilyTag(tag))?;
        if found != self.family {
            return Err(ReplicationError::WrongFamily { expected: self.family, found });
        }
        let id = r.read_u16()?;
        let wire = self
            .types
            .get(usize::from(id))
            .ok_or(ReplicationError::UnknownTypeId { family: self.family, id })?;
        let payload = r.read_bytes()?;
        (wire.decode)(payload)
    }

    /// `u8` count (clamped to `max_items`) followed by the items. Returns the count written.
    fn write_array(
        &self,
        w: &mut NetWriter,
        items: &[(&'static str, &dyn Any)],
        max_items: u8,
    ) -> Result<u8> {
        let count = items.len().min(usize::from(max_items));
        if items.len() > count {
            warn!("Too many {} items ({}) to replicate. Clamping to {}", self.family, items.len(), count);
        }
        w.write_u8(count as u8);
        for (type_name, item) in &items[..count] {
            self.write_item(w, type_name, *item)?;
        }
        Ok(count as u8)
    }

    /// Active then queued items, sharing one `max_items` budget; active items go first.
    fn write_group(
        &self,
        w: &mut NetWriter,
        active: &[(&'static str, &dyn Any)],
        queued: &[(&'static str, &dyn Any)],
        max_items: u8,
    ) -> Result<()> {
        let written = self.write_array(w, active, max_items)?;
        self.write_array(w, queued, max_items - written)?;
        Ok(())
    }

    fn read_array(&self, r: &mut NetReader<'_>) -> Result<Vec<Box<B>>> {
        let count = r.read_u8()?;
        let mut items = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            items.push(self.read_item(r)?);
        }
        Ok(items)
    }
}

/// Maps concrete types to per-family wire ids and encodes whole sync states.
#[derive(Debug)]
pub struct ReplicationRegistry {
    layered_moves: FamilyTable<dyn LayeredMove>,
    move_data: FamilyTable<dyn LayeredMoveInstancedData>,
    modifiers: FamilyTable<dyn MovementModifier>,
    effects: FamilyTable<dyn InstantMovementEffect>,
    data_structs: FamilyTable<dyn MoverDataStruct>,
    max_items: u8,
}

impl Default for ReplicationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplicationRegistry {
    /// Empty registry; nothing can be replicated until types are registered.
    pub fn new() -> Self {
        Self {
            layered_moves: FamilyTable::new(TypeFamily::LayeredMove),
            move_data: FamilyTable::new(TypeFamily::LayeredMoveData),
            modifiers: FamilyTable::new(TypeFamily::MovementModifier),
            effects: FamilyTable::new(TypeFamily::InstantEffect),
            data_structs: FamilyTable::new(TypeFamily::DataStruct),
            max_items: u8::MAX,
        }
    }

    /// Registry with every bundled type. Ids follow the order below.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let registered = [
            registry.register_data_struct::<UpdatedMotionState>(),
            registry.register_data_struct::<CharacterDefaultInputs>(),
            registry.register_layered_move::<LaunchMove>(),
            registry.register_layered_move::<LinearVelocityMove>(),
            registry.register_layered_move::<JumpImpulseMove>(),
            registry.register_layered_move::<MoveToMove>(),
            registry.register_layered_move::<JumpToMove>(),
            registry.register_layered_move::<RadialImpulseMove>(),
            registry.register_move_data::<LaunchMoveData>(),
            registry.register_modifier::<StanceModifier>(),
            registry.register_instant_effect::<TeleportEffect>(),
            registry.register_instant_effect::<ApplyVelocityEffect>(),
            registry.register_instant_effect::<JumpImpulseEffect>(),
        ];
        for result in registered {
            if let Err(e) = result {
                warn!("Default replication type skipped: {}", e);
            }
        }
        registry
    }

    /// Process-wide [`with_defaults`](Self::with_defaults) registry.
    pub fn shared() -> &'static ReplicationRegistry {
        &SHARED
    }

    /// Per-array item cap (see `MoverSettings::max_replicated_items`).
    pub fn with_max_items(mut self, max_items: u8) -> Self {
        self.max_items = max_items;
        self
    }

    pub fn max_items(&self) -> u8 {
        self.max_items
    }

    pub fn register_layered_move<T: LayeredMove + Clone + Serialize + DeserializeOwned>(&mut self) -> Result<u16> {
        self.layered_moves.register(any::type_name::<T>(), encode_payload::<T>, decode_layered_move::<T>)
    }

    pub fn register_move_data<T: LayeredMoveInstancedData + Clone + Serialize + DeserializeOwned>(
        &mut self,
    ) -> Result<u16> {
        self.move_data.register(any::type_name::<T>(), encode_payload::<T>, decode_move_data::<T>)
    }

    pub fn register_modifier<T: MovementModifier + Clone + Serialize + DeserializeOwned>(&mut self) -> Result<u16> {
        self.modifiers.register(any::type_name::<T>(), encode_payload::<T>, decode_modifier::<T>)
    }

    pub fn register_instant_effect<T: InstantMovementEffect + Clone + Serialize + DeserializeOwned>(
        &mut self,
    ) -> Result<u16> {
        self.effects.register(any::type_name::<T>(), encode_payload::<T>, decode_effect::<T>)
    }

    pub fn register_data_struct<T: MoverDataStruct + Clone + Serialize + DeserializeOwned>(&mut self) -> Result<u16> {
        self.data_structs.register(any::type_name::<T>(), encode_payload::<T>, decode_data_struct::<T>)
    }

    /// Wire id of a registered type name within `family`.
    pub fn wire_id(&self, family: TypeFamily, type_name: &str) -> Option<u16> {
        match family {
            TypeFamily::LayeredMove => self.layered_moves.id_of(type_name),
            TypeFamily::LayeredMoveData => self.move_data.id_of(type_name),
            TypeFamily::MovementModifier => self.modifiers.id_of(type_name),
            TypeFamily::InstantEffect => self.effects.id_of(type_name),
            TypeFamily::DataStruct => self.data_structs.id_of(type_name),
        }
    }

    // ========== Groups ==========

    pub fn encode_layered_moves(&self, group: &LayeredMoveGroup, w: &mut NetWriter) -> Result<()> {
        let active: Vec<(&'static str, &dyn Any)> =
            group.active_moves().map(|m| (m.move_type_name(), m.as_any())).collect();
        let queued: Vec<(&'static str, &dyn Any)> =
            group.queued_moves().map(|m| (m.move_type_name(), m.as_any())).collect();
        self.layered_moves.write_group(w, &active, &queued, self.max_items)
    }

    pub fn decode_layered_moves(&self, r: &mut NetReader<'_>) -> Result<LayeredMoveGroup> {
        let active = self.layered_moves.read_array(r)?;
        let queued = self.layered_moves.read_array(r)?;
        Ok(LayeredMoveGroup::from_parts(active, queued))
    }

    /// Only the data travels; logic is rebound on the receiving side.
    pub fn encode_layered_move_instances(&self, group: &LayeredMoveInstanceGroup, w: &mut NetWriter) -> Result<()> {
        let active: Vec<(&'static str, &dyn Any)> =
            group.active_moves().iter().map(|m| (m.data_type_name(), m.data().as_any())).collect();
        let queued: Vec<(&'static str, &dyn Any)> =
            group.queued_moves().iter().map(|m| (m.data_type_name(), m.data().as_any())).collect();
        self.move_data.write_group(w, &active, &queued, self.max_items)
    }

    /// Decoded instances have no logic until `populate_missing_active_move_logic` runs.
    pub fn decode_layered_move_instances(&self, r: &mut NetReader<'_>) -> Result<LayeredMoveInstanceGroup> {
        let active = self.move_data.read_array(r)?.into_iter().map(LayeredMoveInstance::from_data).collect();
        let queued = self.move_data.read_array(r)?.into_iter().map(LayeredMoveInstance::from_data).collect();
        Ok(LayeredMoveInstanceGroup::from_parts(active, queued))
    }

    /// Handles are local and not written.
    pub fn encode_modifiers(&self, group: &MovementModifierGroup, w: &mut NetWriter) -> Result<()> {
        let active: Vec<(&'static str, &dyn Any)> =
            group.active_modifiers().map(|m| (m.modifier_type_name(), m.as_any())).collect();
        let queued: Vec<(&'static str, &dyn Any)> =
            group.queued_modifiers().map(|m| (m.modifier_type_name(), m.as_any())).collect();
        self.modifiers.write_group(w, &active, &queued, self.max_items)
    }

    pub fn decode_modifiers(&self, r: &mut NetReader<'_>) -> Result<MovementModifierGroup> {
        let active = self.modifiers.read_array(r)?;
        let queued = self.modifiers.read_array(r)?;
        Ok(MovementModifierGroup::from_parts(active, queued))
    }

    pub fn encode_collection(&self, collection: &MoverDataCollection, w: &mut NetWriter) -> Result<()> {
        let entries: Vec<(&'static str, &dyn Any)> =
            collection.iter().map(|d| (d.data_type_name(), d.as_any())).collect();
        self.data_structs.write_array(w, &entries, self.max_items)?;
        Ok(())
    }

    pub fn decode_collection(&self, r: &mut NetReader<'_>) -> Result<MoverDataCollection> {
        let mut collection = MoverDataCollection::new();
        for data in self.data_structs.read_array(r)? {
            collection.add_or_overwrite_data(data);
        }
        Ok(collection)
    }

    // ========== Sync state ==========

    pub fn encode_sync_state(&self, state: &MoverSyncState, w: &mut NetWriter) -> Result<()> {
        w.write_str(&state.movement_mode)?;
        self.encode_collection(&state.collection, w)?;
        self.encode_layered_moves(&state.layered_moves, w)?;
        self.encode_layered_move_instances(&state.layered_move_instances, w)?;
        self.encode_modifiers(&state.movement_modifiers, w)
    }

    pub fn decode_sync_state(&self, r: &mut NetReader<'_>) -> Result<MoverSyncState> {
        Ok(MoverSyncState {
            movement_mode: r.read_str()?,
            collection: self.decode_collection(r)?,
            layered_moves: self.decode_layered_moves(r)?,
            layered_move_instances: self.decode_layered_move_instances(r)?,
            movement_modifiers: self.decode_modifiers(r)?,
        })
    }

    pub fn sync_state_to_bytes(&self, state: &MoverSyncState) -> Result<Vec<u8>> {
        let mut w = NetWriter::new();
        self.encode_sync_state(state, &mut w)?;
        Ok(w.into_bytes())
    }

    /// Decode one sync state that must span all of `bytes`.
    pub fn sync_state_from_bytes(&self, bytes: &[u8]) -> Result<MoverSyncState> {
        let mut r = NetReader::new(bytes);
        let state = self.decode_sync_state(&mut r)?;
        r.finish()?;
        Ok(state)
    }

    // ========== Instant effects ==========

    pub fn encode_scheduled_effects(&self, effects: &[ScheduledInstantMovementEffect], w: &mut NetWriter) -> Result<()> {
        let count = effects.len().min(usize::from(self.max_items));
        if effects.len() > count {
            warn!("Too many instant effects ({}) to replicate. Clamping to {}", effects.len(), count);
        }
        w.write_u8(count as u8);
        for scheduled in &effects[..count] {
            w.write_u32(scheduled.execution_server_frame);
            w.write_f64(scheduled.execution_server_time_secs);
            w.write_bool(scheduled.is_fixed_dt);
            self.effects.write_item(w, scheduled.effect.effect_type_name(), scheduled.effect.as_any())?;
        }
        Ok(())
    }

    pub fn decode_scheduled_effects(&self, r: &mut NetReader<'_>) -> Result<Vec<ScheduledInstantMovementEffect>> {
        let count = r.read_u8()?;
        let mut effects = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let execution_server_frame = r.read_u32()?;
            let execution_server_time_secs = r.read_f64()?;
            let is_fixed_dt = r.read_bool()?;
            let effect = self.effects.read_item(r)?;
            effects.push(ScheduledInstantMovementEffect {
                execution_server_frame,
                execution_server_time_secs,
                is_fixed_dt,
                effect,
            });
        }
        Ok(effects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modifiers::Stance;
    use crate::types::MoverTimeStep;
    use nalgebra::Vector3;

    fn sample_state() -> MoverSyncState {
        let mut state = MoverSyncState::with_mode("Falling");
        let motion = state.collection.find_or_add::<UpdatedMotionState>().unwrap();
        motion.location = Vector3::new(1.0, 2.0, 3.0);
        motion.velocity = Vector3::new(0.0, 0.0, -50.0);
        state.layered_moves.queue_layered_move(Box::new(LaunchMove::new(Vector3::z() * 400.0, 250.0)));
        state
            .layered_move_instances
            .queue_layered_move(LayeredMoveInstance::from_data(Box::new(LaunchMoveData::new(Vector3::x(), 100.0))));
        state.movement_modifiers.queue_movement_modifier(Box::new(StanceModifier::new(Stance::Crouch)));
        state
    }

    #[test]
    fn test_sync_state_survives_the_wire() {
        let registry = ReplicationRegistry::with_defaults();
        let state = sample_state();
        let bytes = registry.sync_state_to_bytes(&state).unwrap();
        let decoded = registry.sync_state_from_bytes(&bytes).unwrap();

        assert!(decoded.has_same_contents(&state));
        assert!(!decoded.should_reconcile(&state));
        assert_eq!(decoded.layered_moves.find_queued_move::<LaunchMove>().map(|m| m.core.duration_ms), Some(250.0));
        assert!(decoded.layered_move_instances.queued_moves().iter().all(|m| !m.has_logic()));
    }

    #[test]
    fn test_unregistered_type_refuses_to_encode() {
        let registry = ReplicationRegistry::new();
        let err = registry.sync_state_to_bytes(&sample_state()).unwrap_err();
        assert!(matches!(err, ReplicationError::UnregisteredType { family: TypeFamily::DataStruct, .. }));
    }

    #[test]
    fn test_oversized_mode_name_fails_to_encode() {
        let registry = ReplicationRegistry::with_defaults();
        let state = MoverSyncState::with_mode("M".repeat(70_000));
        assert!(matches!(registry.sync_state_to_bytes(&state), Err(ReplicationError::PayloadTooLarge(70_000))));
    }

    #[test]
    fn test_unknown_id_aborts_array() {
        let mut w = NetWriter::new();
        w.write_u8(2);
        w.write_u8(TypeFamily::LayeredMove.wire_tag());
        w.write_u16(999);
        w.write_bytes(&[0x80]).unwrap();

        let registry = ReplicationRegistry::with_defaults();
        let bytes = w.into_bytes();
        let err = registry.decode_layered_moves(&mut NetReader::new(&bytes)).unwrap_err();
        assert!(matches!(err, ReplicationError::UnknownTypeId { family: TypeFamily::LayeredMove, id: 999 }));
    }

    #[test]
    fn test_item_from_another_family_is_rejected() {
        let registry = ReplicationRegistry::with_defaults();
        let mut modifiers = MovementModifierGroup::new();
        modifiers.queue_movement_modifier(Box::new(StanceModifier::new(Stance::Prone)));

        let mut w = NetWriter::new();
        registry.encode_modifiers(&modifiers, &mut w).unwrap();
        let bytes = w.into_bytes();

        assert_eq!(registry.decode_modifiers(&mut NetReader::new(&bytes)).map(|g| g.num_queued()).ok(), Some(1));
        let err = registry.decode_layered_moves(&mut NetReader::new(&bytes)).unwrap_err();
        assert!(matches!(
            err,
            ReplicationError::WrongFamily { expected: TypeFamily::LayeredMove, found: TypeFamily::MovementModifier }
        ));
    }

    #[test]
    fn test_array_is_clamped_to_max_items() {
        let registry = ReplicationRegistry::with_defaults().with_max_items(1);
        let mut group = LayeredMoveGroup::new();
        group.queue_layered_move(Box::new(LaunchMove::new(Vector3::z(), 10.0)));
        group.queue_layered_move(Box::new(JumpImpulseMove::new(300.0)));

        let mut w = NetWriter::new();
        registry.encode_layered_moves(&group, &mut w).unwrap();
        let bytes = w.into_bytes();
        let decoded = registry.decode_layered_moves(&mut NetReader::new(&bytes)).unwrap();
        assert_eq!(decoded.num_queued(), 1);
        assert!(decoded.find_queued_move::<LaunchMove>().is_some());
    }

    fn encode_then_decode_moves(registry: &ReplicationRegistry, group: &LayeredMoveGroup) -> LayeredMoveGroup {
        let mut w = NetWriter::new();
        registry.encode_layered_moves(group, &mut w).unwrap();
        let bytes = w.into_bytes();
        registry.decode_layered_moves(&mut NetReader::new(&bytes)).unwrap()
    }

    #[test]
    fn test_path_and_radial_moves_replicate() {
        let mut jump = JumpToMove::new(400.0, 120.0, 800.0);
        jump.use_actor_rotation = false;
        let mut radial = RadialImpulseMove::pull(Vector3::new(5.0, 0.0, 0.0), 300.0, 80.0);
        radial.fixed_world_direction = Some(Vector3::y());
        let group = LayeredMoveGroup::from_parts(
            vec![Box::new(MoveToMove::new(Vector3::zeros(), Vector3::x() * 250.0, 500.0)) as Box<dyn LayeredMove>],
            vec![Box::new(jump.clone()), Box::new(radial.clone())],
        );

        let decoded = encode_then_decode_moves(&ReplicationRegistry::with_defaults(), &group);
        assert_eq!(decoded.find_active_move::<MoveToMove>().map(|m| m.target_location), Some(Vector3::x() * 250.0));
        assert_eq!(decoded.find_queued_move::<JumpToMove>(), Some(&jump));
        assert_eq!(decoded.find_queued_move::<RadialImpulseMove>(), Some(&radial));
    }

    #[test]
    fn test_active_and_queued_share_one_budget() {
        let group = LayeredMoveGroup::from_parts(
            vec![
                Box::new(LaunchMove::new(Vector3::z(), 100.0)) as Box<dyn LayeredMove>,
                Box::new(JumpImpulseMove::new(300.0)),
            ],
            vec![Box::new(LaunchMove::new(Vector3::x(), 100.0)) as Box<dyn LayeredMove>, Box::new(JumpImpulseMove::new(200.0))],
        );
        assert_eq!((group.num_active(), group.num_queued()), (2, 2));

        let full = encode_then_decode_moves(&ReplicationRegistry::with_defaults().with_max_items(2), &group);
        assert_eq!((full.num_active(), full.num_queued()), (2, 0));

        // Two slots go to the active moves, the third to the first queued one
        let partial = encode_then_decode_moves(&ReplicationRegistry::with_defaults().with_max_items(3), &group);
        assert_eq!((partial.num_active(), partial.num_queued()), (2, 1));
        assert!(partial.find_queued_move::<LaunchMove>().is_some());
    }

    #[test]
    fn test_modifier_queue_gets_leftover_budget() {
        let registry = ReplicationRegistry::with_defaults().with_max_items(1);
        let group = MovementModifierGroup::from_parts(
            vec![Box::new(StanceModifier::new(Stance::Crouch)) as Box<dyn MovementModifier>],
            vec![Box::new(StanceModifier::new(Stance::Prone)) as Box<dyn MovementModifier>],
        );

        let mut w = NetWriter::new();
        registry.encode_modifiers(&group, &mut w).unwrap();
        let bytes = w.into_bytes();
        let decoded = registry.decode_modifiers(&mut NetReader::new(&bytes)).unwrap();
        assert_eq!((decoded.num_active(), decoded.num_queued()), (1, 0));
        assert_eq!(decoded.find_modifier_by_type::<StanceModifier>().map(|m| m.stance), Some(Stance::Crouch));
    }

    #[test]
    fn test_shared_registry_matches_defaults() {
        let local = ReplicationRegistry::with_defaults();
        let shared = ReplicationRegistry::shared();
        let name = any::type_name::<StanceModifier>();
        assert!(shared.wire_id(TypeFamily::MovementModifier, name).is_some());
        assert_eq!(shared.wire_id(TypeFamily::MovementModifier, name), local.wire_id(TypeFamily::MovementModifier, name));
        assert!(std::ptr::eq(shared, ReplicationRegistry::shared()));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = ReplicationRegistry::new();
        assert_eq!(registry.register_modifier::<StanceModifier>().ok(), Some(0));
        assert!(matches!(
            registry.register_modifier::<StanceModifier>(),
            Err(ReplicationError::DuplicateType { family: TypeFamily::MovementModifier, .. })
        ));
        assert_eq!(registry.wire_id(TypeFamily::MovementModifier, any::type_name::<StanceModifier>()), Some(0));
    }

    #[test]
    fn test_scheduled_effects_keep_their_schedule() {
        let registry = ReplicationRegistry::with_defaults();
        let ts = MoverTimeStep::new(500.0, 16.0, 30);
        let effects = vec![
            ScheduledInstantMovementEffect::schedule(&ts, Box::new(JumpImpulseEffect::new(420.0)), 0.05, Some(0.02)),
            ScheduledInstantMovementEffect::immediate(Box::new(TeleportEffect::new(Vector3::x()))),
        ];

        let mut w = NetWriter::new();
        registry.encode_scheduled_effects(&effects, &mut w).unwrap();
        let bytes = w.into_bytes();
        let decoded = registry.decode_scheduled_effects(&mut NetReader::new(&bytes)).unwrap();

        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].execution_server_frame, 33);
        assert_eq!(decoded[0].effect.downcast_ref::<JumpImpulseEffect>().map(|j| j.upwards_speed), Some(420.0));
        assert!(decoded[1].effect.is::<TeleportEffect>());
    }

    #[cfg(all(test, feature = "proptest"))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: arbitrary input is rejected or decoded, never a panic
            #[test]
            fn prop_garbage_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
                let registry = ReplicationRegistry::with_defaults();
                let _ = registry.sync_state_from_bytes(&bytes);
                let _ = registry.decode_scheduled_effects(&mut NetReader::new(&bytes));
            }

            /// Property: every strict prefix of a valid archive fails to decode
            #[test]
            fn prop_truncated_archive_fails(cut in 0usize..1024) {
                let registry = ReplicationRegistry::with_defaults();
                let bytes = registry.sync_state_to_bytes(&sample_state()).unwrap();
                let cut = cut % bytes.len();
                prop_assert!(registry.sync_state_from_bytes(&bytes[..cut]).is_err());
            }
        }
    }
}
