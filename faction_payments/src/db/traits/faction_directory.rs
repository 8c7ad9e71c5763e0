use crate::db_types::Faction;

#[allow(async_fn_in_trait)]
pub trait FactionDirectory {
    type Error: std::error::Error;

    /// All registered factions, with their active API keys in priority order. Factions without any keys are included;
    /// callers decide what to do with them.
    async fn factions(&self) -> Result<Vec<Faction>, Self::Error>;
}
