use std::sync::Arc;

use async_trait::async_trait;
use busline_booking::{NotificationRelay, ReservationLedger};
use busline_catalog::{BusService, RouteService};
use busline_core::repository::{
    AdminRepository, BusRepository, RepoError, ReservationRepository, RouteRepository, Store,
    UserRepository,
};
use busline_core::notify::user_of_destination;
use busline_core::Notifier;
use busline_identity::{AccountService, Argon2Hasher, JwtCodec};
use busline_shared::Notification;
use busline_store::app_config::AuthConfig;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<AccountService>,
    pub routes: Arc<RouteService>,
    pub buses: Arc<BusService>,
    pub ledger: Arc<ReservationLedger>,
    pub relay: Arc<NotificationRelay>,
    pub notifications: broadcast::Sender<Notification>,
}

impl AppState {
    /// Wire every service onto one store.
    pub fn with_store<S>(store: Arc<S>, auth: &AuthConfig, channel_capacity: usize) -> Self
    where
        S: Store + 'static,
    {
        let users: Arc<dyn UserRepository> = store.clone();
        let admins: Arc<dyn AdminRepository> = store.clone();
        let routes: Arc<dyn RouteRepository> = store.clone();
        let buses: Arc<dyn BusRepository> = store.clone();
        let reservations: Arc<dyn ReservationRepository> = store;

        let (notifications, _) = broadcast::channel(channel_capacity.max(1));
        let ledger = Arc::new(ReservationLedger::new(
            users.clone(),
            routes.clone(),
            buses.clone(),
            reservations,
        ));
        let notifier = Arc::new(BroadcastNotifier {
            tx: notifications.clone(),
        });

        Self {
            accounts: Arc::new(AccountService::new(
                users,
                admins,
                Arc::new(Argon2Hasher::new()),
                Arc::new(JwtCodec::new(&auth.jwt_secret, auth.jwt_expiration_seconds)),
            )),
            routes: Arc::new(RouteService::new(routes.clone(), buses.clone())),
            buses: Arc::new(BusService::new(routes, buses)),
            relay: Arc::new(NotificationRelay::new(ledger.clone(), notifier)),
            ledger,
            notifications,
        }
    }
}

/// Publishes per-user messages onto the broadcast channel that the
/// WebSocket sessions subscribe to.
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Notification>,
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn send(&self, destination: &str, message: &str) -> Result<(), RepoError> {
        if self.tx.receiver_count() == 0 {
            tracing::debug!(
                user_id = ?user_of_destination(destination),
                "no live subscribers, message dropped"
            );
            return Ok(());
        }
        self.tx
            .send(Notification::new(destination, message))
            .map(|_| ())
            .map_err(|e| e.to_string().into())
    }
}
