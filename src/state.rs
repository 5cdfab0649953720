use crate::rate_limit::RequestAdmissionGuard;
use crate::store::StoreBackend;

// app's shared state
pub struct AppState {
    pub guard: RequestAdmissionGuard<StoreBackend>,
    pub cal_url: String, // base of the scheduling link handed back on success
}
