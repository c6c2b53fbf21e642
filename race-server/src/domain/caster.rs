use uuid::Uuid;

/// A privileged-broadcast caster scoped to one race. Mutually exclusive
/// with Participant on the same `(race, user)` pair.
#[derive(Debug, Clone)]
pub struct Caster {
    pub race_id: Uuid,
    pub user_id: Uuid,
    pub display_name: String,
}

impl Caster {
    pub fn to_wire(&self) -> race_contracts::CasterInfoV1 {
        race_contracts::CasterInfoV1 {
            user_id: self.user_id,
            display_name: self.display_name.clone(),
        }
    }
}
