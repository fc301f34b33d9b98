use std::sync::Arc;
use seatline_core::{PayloadAssembler, ReservationService};

#[derive(Clone)]
pub struct AppState {
    pub reservations: Arc<ReservationService>,
    pub assembler: Arc<PayloadAssembler>,
}
