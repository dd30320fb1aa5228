use nsi_engine::EngineContext;

#[derive(Clone)]
pub struct AppState {
    pub ctx: EngineContext,
}
