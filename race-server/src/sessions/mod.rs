pub mod mod_session;
pub mod spectator_session;
