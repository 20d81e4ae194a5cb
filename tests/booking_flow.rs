//! Flujo completo de reservas sobre el almacén en memoria

mod common;

use chrono::Duration;
use futures::future::join_all;
use rust_decimal::Decimal;
use std::collections::HashSet;
use uuid::Uuid;

use common::{d, setup};
use vehicle_rental::models::{
    Actor, PaymentIntent, PaymentIntentStatus, ReservationGroupDetail, ReservationStatus,
};
use vehicle_rental::services::{
    AvailabilityService, CartService, CatalogService, CheckoutService, MockCardGateway,
    NotificationEvent, PaymentService, ReservationService, StatusMachine,
};
use vehicle_rental::utils::AppError;

const SUCCESS_CARD: &str = "4242424242424242";
const DECLINED_CARD: &str = "4000000000000002";

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cart_creation_yields_one_cart() {
    let env = setup().await;
    let customer = Actor::customer(Uuid::new_v4());

    let tasks = (0..10).map(|_| {
        let ctx = env.ctx.clone();
        tokio::spawn(async move { CartService::new(&ctx).get_or_create_active(&customer).await })
    });
    let ids: HashSet<Uuid> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap().id)
        .collect();

    assert_eq!(ids.len(), 1);
    let view = CartService::new(&env.ctx).view(&customer).await.unwrap();
    assert_eq!(view.cart.map(|c| c.id), ids.into_iter().next());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_approvals_never_double_book() {
    let env = setup().await;
    let van = env.add_van("Sprinter", 50).await;

    // Pending no bloquea: ambos clientes llegan a checkout con fechas solapadas
    let mut group_ids = Vec::new();
    for (start, end) in [(d(6, 10), d(6, 15)), (d(6, 12), d(6, 20))] {
        let customer = Actor::customer(Uuid::new_v4());
        CartService::new(&env.ctx)
            .add_item(&customer, &env.selection(&van, start, end))
            .await
            .unwrap();
        let detail = CheckoutService::new(&env.ctx).checkout(&customer).await.unwrap();
        assert_eq!(detail.group.status, ReservationStatus::Pending);
        group_ids.push(detail.group.id);
    }

    let tasks = group_ids.iter().map(|group_id| {
        let ctx = env.ctx.clone();
        let staff = env.staff;
        let group_id = *group_id;
        tokio::spawn(async move { StatusMachine::new(&ctx).transition(group_id, "approve", &staff).await })
    });
    let results: Vec<_> = join_all(tasks).await.into_iter().map(|j| j.unwrap()).collect();

    let approved = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(approved, 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(AppError::VehicleUnavailable { vehicle_id, .. }) if *vehicle_id == van.id)));

    // El perdedor sigue pendiente
    let groups = ReservationService::new(&env.ctx).list_groups(&env.staff).await.unwrap();
    let statuses: Vec<_> = groups.iter().map(|g| g.group.status).collect();
    assert!(statuses.contains(&ReservationStatus::AwaitingPayment));
    assert!(statuses.contains(&ReservationStatus::Pending));
}

#[tokio::test]
async fn test_checkout_is_all_or_nothing() {
    let env = setup().await;
    let sprinter = env.add_van("Sprinter", 50).await;
    let transit = env.add_van("Transit", 40).await;

    let first = Actor::customer(Uuid::new_v4());
    CartService::new(&env.ctx)
        .add_item(&first, &env.selection(&sprinter, d(6, 10), d(6, 15)))
        .await
        .unwrap();
    let first_group = CheckoutService::new(&env.ctx).checkout(&first).await.unwrap();

    let second = Actor::customer(Uuid::new_v4());
    let cart = CartService::new(&env.ctx);
    cart.add_item(&second, &env.selection(&transit, d(6, 10), d(6, 15)))
        .await
        .unwrap();
    cart.add_item(&second, &env.selection(&sprinter, d(6, 12), d(6, 14)))
        .await
        .unwrap();
    let before = cart.view(&second).await.unwrap();

    // La aprobación ocupa el Sprinter entre el add y el checkout
    StatusMachine::new(&env.ctx)
        .transition(first_group.group.id, "approve", &env.staff)
        .await
        .unwrap();

    let err = CheckoutService::new(&env.ctx).checkout(&second).await.unwrap_err();
    match err {
        AppError::VehicleUnavailable { vehicle_id, vehicle_name, start_date, end_date } => {
            assert_eq!(vehicle_id, sprinter.id);
            assert_eq!(vehicle_name, "Sprinter");
            assert_eq!((start_date, end_date), (d(6, 12), d(6, 14)));
        }
        other => panic!("expected VehicleUnavailable, got {:?}", other),
    }

    let after = cart.view(&second).await.unwrap();
    assert_eq!(after.lines.len(), 2);
    assert_eq!(after.cart.map(|c| c.id), before.cart.map(|c| c.id));
    assert!(ReservationService::new(&env.ctx)
        .list_groups(&second)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_checkout_without_items_fails() {
    let env = setup().await;
    let customer = Actor::customer(Uuid::new_v4());

    let err = CheckoutService::new(&env.ctx).checkout(&customer).await.unwrap_err();
    assert!(matches!(err, AppError::EmptyCart));

    CartService::new(&env.ctx).get_or_create_active(&customer).await.unwrap();
    let err = CheckoutService::new(&env.ctx).checkout(&customer).await.unwrap_err();
    assert!(matches!(err, AppError::EmptyCart));
}

#[tokio::test]
async fn test_checkout_prices_lines_and_clears_cart() {
    let env = setup().await;
    let van = env.add_van("Sprinter", 10).await;
    let customer = Actor::customer(Uuid::new_v4());

    CartService::new(&env.ctx)
        .add_item(&customer, &env.selection(&van, d(6, 1), d(6, 8)))
        .await
        .unwrap();
    let detail = CheckoutService::new(&env.ctx).checkout(&customer).await.unwrap();

    assert_eq!(detail.reservations.len(), 1);
    assert_eq!(detail.reservations[0].total_price, Decimal::from(60));
    assert_eq!(detail.total_price, Decimal::from(60));
    let reference = detail.group.reference.clone().unwrap();
    assert_eq!(reference.len(), 8);

    let view = CartService::new(&env.ctx).view(&customer).await.unwrap();
    assert!(view.cart.is_none());
    assert_eq!(env.notifier.count(NotificationEvent::ReservationCreated), 1);
}

#[tokio::test]
async fn test_second_checkout_reuses_open_group() {
    let env = setup().await;
    let sprinter = env.add_van("Sprinter", 50).await;
    let transit = env.add_van("Transit", 40).await;
    let customer = Actor::customer(Uuid::new_v4());
    let cart = CartService::new(&env.ctx);
    let checkout = CheckoutService::new(&env.ctx);

    cart.add_item(&customer, &env.selection(&sprinter, d(6, 10), d(6, 12)))
        .await
        .unwrap();
    let first = checkout.checkout(&customer).await.unwrap();

    cart.add_item(&customer, &env.selection(&transit, d(6, 10), d(6, 12)))
        .await
        .unwrap();
    let second = checkout.checkout(&customer).await.unwrap();

    assert_eq!(first.group.id, second.group.id);
    assert_eq!(first.group.reference, second.group.reference);
    assert_eq!(second.reservations.len(), 2);
    assert_eq!(env.notifier.count(NotificationEvent::ReservationCreated), 1);
    assert_eq!(env.notifier.count(NotificationEvent::VehicleAdded), 1);

    // Una línea propia pendiente tampoco puede duplicarse
    cart.add_item(&customer, &env.selection(&sprinter, d(6, 11), d(6, 13)))
        .await
        .unwrap();
    let err = checkout.checkout(&customer).await.unwrap_err();
    assert!(matches!(err, AppError::VehicleUnavailable { .. }));
}

#[tokio::test]
async fn test_complete_requires_awaiting_payment() {
    let env = setup().await;
    let van = env.add_van("Sprinter", 50).await;
    let customer = Actor::customer(Uuid::new_v4());
    CartService::new(&env.ctx)
        .add_item(&customer, &env.selection(&van, d(6, 10), d(6, 12)))
        .await
        .unwrap();
    let group_id = CheckoutService::new(&env.ctx).checkout(&customer).await.unwrap().group.id;
    let machine = StatusMachine::new(&env.ctx);

    let err = machine.transition(group_id, "complete", &env.staff).await.unwrap_err();
    match err {
        AppError::Transition(message) => {
            assert!(message.contains("pending"));
            assert!(message.contains("completed"));
        }
        other => panic!("expected Transition, got {:?}", other),
    }

    machine.transition(group_id, "approve", &env.staff).await.unwrap();
    let group = machine.transition(group_id, "complete", &env.staff).await.unwrap();
    assert_eq!(group.status, ReservationStatus::Completed);
    assert_eq!(env.notifier.count(NotificationEvent::StatusChanged), 2);
}

#[tokio::test]
async fn test_permission_is_checked_before_status() {
    let env = setup().await;
    let van = env.add_van("Sprinter", 50).await;
    let owner = Actor::customer(Uuid::new_v4());
    CartService::new(&env.ctx)
        .add_item(&owner, &env.selection(&van, d(6, 10), d(6, 12)))
        .await
        .unwrap();
    let group_id = CheckoutService::new(&env.ctx).checkout(&owner).await.unwrap().group.id;
    let machine = StatusMachine::new(&env.ctx);

    let stranger = Actor::customer(Uuid::new_v4());
    let err = machine.transition(group_id, "cancel", &stranger).await.unwrap_err();
    assert!(matches!(err, AppError::PermissionDenied(_)));

    let group = machine.transition(group_id, "cancel", &owner).await.unwrap();
    assert_eq!(group.status, ReservationStatus::Canceled);

    // Desde canceled ninguna acción es válida, pero el cliente recibe primero el 403
    let err = machine.transition(group_id, "approve", &owner).await.unwrap_err();
    assert!(matches!(err, AppError::PermissionDenied(_)));
    let err = machine.transition(group_id, "approve", &env.staff).await.unwrap_err();
    assert!(matches!(err, AppError::Transition(_)));

    let err = machine.transition(group_id, "refund", &env.staff).await.unwrap_err();
    assert!(matches!(err, AppError::Transition(_)));
    let err = machine.transition(Uuid::new_v4(), "approve", &env.staff).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_reject_cancels_open_payment_intents() {
    let env = setup().await;
    let van = env.add_van("Sprinter", 50).await;
    let customer = Actor::customer(Uuid::new_v4());
    CartService::new(&env.ctx)
        .add_item(&customer, &env.selection(&van, d(6, 10), d(6, 12)))
        .await
        .unwrap();
    let group_id = CheckoutService::new(&env.ctx).checkout(&customer).await.unwrap().group.id;

    // Intent abierto sobre un grupo todavía pendiente, escrito directamente en el almacén
    let now = env.ctx.clock.now();
    let intent = PaymentIntent {
        id: Uuid::new_v4(),
        group_id,
        amount_minor: 10_000,
        currency: "EUR".to_string(),
        client_secret: "a".repeat(48),
        status: PaymentIntentStatus::RequiresConfirmation,
        created_at: now,
        expires_at: now + Duration::minutes(30),
    };
    let mut tx = env.ctx.repo.begin().await.unwrap();
    assert!(tx.try_insert_payment_intent(&intent).await.unwrap());
    tx.commit().await.unwrap();

    let group = StatusMachine::new(&env.ctx)
        .transition(group_id, "reject", &env.staff)
        .await
        .unwrap();
    assert_eq!(group.status, ReservationStatus::Rejected);

    let intents = PaymentService::new(&env.ctx)
        .group_payment_intents(&env.staff, group_id)
        .await
        .unwrap();
    assert_eq!(intents.len(), 1);
    assert_eq!(intents[0].status, PaymentIntentStatus::Canceled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_checkouts_get_unique_references() {
    let env = setup().await;
    let van = env.add_van("Sprinter", 50).await;

    let tasks = (0..20).map(|_| {
        let ctx = env.ctx.clone();
        let selection = env.selection(&van, d(6, 10), d(6, 12));
        tokio::spawn(async move {
            let customer = Actor::customer(Uuid::new_v4());
            CartService::new(&ctx).add_item(&customer, &selection).await?;
            CheckoutService::new(&ctx).checkout(&customer).await
        })
    });
    let references: Vec<String> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap().group.reference.unwrap())
        .collect();

    let unique: HashSet<&String> = references.iter().collect();
    assert_eq!(unique.len(), references.len());
}

#[tokio::test]
async fn test_group_detail_round_trips_through_json() {
    let env = setup().await;
    let sprinter = env.add_van("Sprinter", 33).await;
    let transit = env.add_van("Transit", 41).await;
    let customer = Actor::customer(Uuid::new_v4());
    let cart = CartService::new(&env.ctx);
    cart.add_item(&customer, &env.selection(&sprinter, d(6, 3), d(7, 10)))
        .await
        .unwrap();
    cart.add_item(&customer, &env.selection(&transit, d(6, 20), d(6, 23)))
        .await
        .unwrap();
    let detail = CheckoutService::new(&env.ctx).checkout(&customer).await.unwrap();

    let json = serde_json::to_string(&detail).unwrap();
    let back: ReservationGroupDetail = serde_json::from_str(&json).unwrap();
    assert_eq!(back, detail);
    assert_eq!(back.group.reference, detail.group.reference);
}

#[tokio::test]
async fn test_payment_success_reserves_the_group() {
    let env = setup().await;
    let van = env.add_van("Sprinter", 50).await;
    let customer = Actor::customer(Uuid::new_v4());
    CartService::new(&env.ctx)
        .add_item(&customer, &env.selection(&van, d(6, 10), d(6, 17)))
        .await
        .unwrap();
    let group_id = CheckoutService::new(&env.ctx).checkout(&customer).await.unwrap().group.id;
    let payments = PaymentService::new(&env.ctx);

    // Solo se paga en awaiting_payment
    let err = payments.create_payment_intent(&customer, group_id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    StatusMachine::new(&env.ctx)
        .transition(group_id, "approve", &env.staff)
        .await
        .unwrap();
    let err = payments.create_payment_intent(&env.staff, group_id).await.unwrap_err();
    assert!(matches!(err, AppError::PermissionDenied(_)));

    let intent = payments.create_payment_intent(&customer, group_id).await.unwrap();
    assert_eq!(intent.amount_minor, 30_000);
    assert_eq!(intent.currency, "EUR");
    assert_eq!(intent.status, PaymentIntentStatus::RequiresConfirmation);

    let declined = payments
        .confirm(&MockCardGateway, &intent.client_secret, DECLINED_CARD, None)
        .await
        .unwrap();
    assert_eq!(declined.intent.status, PaymentIntentStatus::Failed);
    assert_eq!(declined.group.status, ReservationStatus::AwaitingPayment);
    assert_eq!(env.notifier.count(NotificationEvent::PaymentFailed), 1);

    let retry = payments.create_payment_intent(&customer, group_id).await.unwrap();
    let paid = payments
        .confirm(&MockCardGateway, &retry.client_secret, SUCCESS_CARD, None)
        .await
        .unwrap();
    assert_eq!(paid.intent.status, PaymentIntentStatus::Succeeded);
    assert_eq!(paid.group.status, ReservationStatus::Reserved);
    assert_eq!(env.notifier.count(NotificationEvent::PaymentSucceeded), 1);
    assert_eq!(env.notifier.count(NotificationEvent::StatusChanged), 2);

    // Un intent ya cerrado no se vuelve a cobrar
    let err = payments
        .confirm(&MockCardGateway, &retry.client_secret, SUCCESS_CARD, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let free = AvailabilityService::new(&env.ctx)
        .search(d(6, 12), d(6, 14), None, None)
        .await
        .unwrap();
    assert!(free.iter().all(|v| v.vehicle.id != van.id));
}

#[tokio::test]
async fn test_new_intent_cancels_previous_one() {
    let env = setup().await;
    let van = env.add_van("Sprinter", 50).await;
    let customer = Actor::customer(Uuid::new_v4());
    CartService::new(&env.ctx)
        .add_item(&customer, &env.selection(&van, d(6, 10), d(6, 12)))
        .await
        .unwrap();
    let group_id = CheckoutService::new(&env.ctx).checkout(&customer).await.unwrap().group.id;
    StatusMachine::new(&env.ctx)
        .transition(group_id, "approve", &env.staff)
        .await
        .unwrap();
    let payments = PaymentService::new(&env.ctx);

    let first = payments.create_payment_intent(&customer, group_id).await.unwrap();
    let second = payments.create_payment_intent(&customer, group_id).await.unwrap();
    assert_ne!(first.client_secret, second.client_secret);

    let intents = payments.group_payment_intents(&customer, group_id).await.unwrap();
    let open: Vec<_> = intents.iter().filter(|i| i.status.is_open()).collect();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, second.id);
    assert_eq!(payments.get_payment_intent(&first.client_secret).await.unwrap().status, PaymentIntentStatus::Canceled);

    // Cancelar el grupo cancela el intent que quedaba abierto
    StatusMachine::new(&env.ctx)
        .transition(group_id, "cancel", &customer)
        .await
        .unwrap();
    let intent = payments.get_payment_intent(&second.client_secret).await.unwrap();
    assert_eq!(intent.status, PaymentIntentStatus::Canceled);
}

#[tokio::test]
async fn test_open_intents_expire_lazily() {
    let env = setup().await;
    let van = env.add_van("Sprinter", 50).await;
    let customer = Actor::customer(Uuid::new_v4());
    CartService::new(&env.ctx)
        .add_item(&customer, &env.selection(&van, d(6, 10), d(6, 12)))
        .await
        .unwrap();
    let group_id = CheckoutService::new(&env.ctx).checkout(&customer).await.unwrap().group.id;
    StatusMachine::new(&env.ctx)
        .transition(group_id, "approve", &env.staff)
        .await
        .unwrap();
    let payments = PaymentService::new(&env.ctx);
    let intent = payments.create_payment_intent(&customer, group_id).await.unwrap();

    env.clock.advance(Duration::minutes(29));
    assert_eq!(
        payments.get_payment_intent(&intent.client_secret).await.unwrap().status,
        PaymentIntentStatus::RequiresConfirmation
    );

    env.clock.advance(Duration::minutes(1));
    assert_eq!(
        payments.get_payment_intent(&intent.client_secret).await.unwrap().status,
        PaymentIntentStatus::Expired
    );

    let err = payments
        .confirm(&MockCardGateway, &intent.client_secret, SUCCESS_CARD, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let group = ReservationService::new(&env.ctx).get_group(&customer, group_id).await.unwrap();
    assert_eq!(group.group.status, ReservationStatus::AwaitingPayment);
}

#[tokio::test]
async fn test_editing_group_lines() {
    let env = setup().await;
    let sprinter = env.add_van("Sprinter", 50).await;
    let transit = env.add_van("Transit", 40).await;
    let customer = Actor::customer(Uuid::new_v4());
    CartService::new(&env.ctx)
        .add_item(&customer, &env.selection(&sprinter, d(6, 10), d(6, 12)))
        .await
        .unwrap();
    let detail = CheckoutService::new(&env.ctx).checkout(&customer).await.unwrap();
    let group_id = detail.group.id;
    let reservations = ReservationService::new(&env.ctx);

    let err = reservations
        .remove_reservation(&customer, detail.reservations[0].id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    StatusMachine::new(&env.ctx)
        .transition(group_id, "approve", &env.staff)
        .await
        .unwrap();
    let payments = PaymentService::new(&env.ctx);
    let intent = payments.create_payment_intent(&customer, group_id).await.unwrap();

    let err = reservations
        .add_vehicle_to_reservation(&env.staff, group_id, &env.selection(&transit, d(6, 10), d(6, 12)))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::PermissionDenied(_)));

    let line = reservations
        .add_vehicle_to_reservation(&customer, group_id, &env.selection(&transit, d(6, 10), d(6, 12)))
        .await
        .unwrap();
    assert_eq!(line.vehicle_name, "Transit");
    assert_eq!(line.total_price, Decimal::from(80));
    assert_eq!(
        payments.get_payment_intent(&intent.client_secret).await.unwrap().status,
        PaymentIntentStatus::Canceled
    );

    // La misma furgoneta en fechas solapadas choca con la línea propia
    let err = reservations
        .add_vehicle_to_reservation(&customer, group_id, &env.selection(&transit, d(6, 11), d(6, 13)))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::VehicleUnavailable { .. }));

    let remaining = reservations.remove_reservation(&env.staff, line.id).await.unwrap();
    assert_eq!(remaining.reservations.len(), 1);
    assert_eq!(remaining.total_price, Decimal::from(100));
    assert_eq!(env.notifier.count(NotificationEvent::VehicleAdded), 1);
    assert_eq!(env.notifier.count(NotificationEvent::VehicleRemoved), 1);

    StatusMachine::new(&env.ctx)
        .transition(group_id, "complete", &env.staff)
        .await
        .unwrap();
    let err = reservations
        .add_vehicle_to_reservation(&customer, group_id, &env.selection(&transit, d(6, 20), d(6, 22)))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn test_group_visibility() {
    let env = setup().await;
    let van = env.add_van("Sprinter", 50).await;
    let owner = Actor::customer(Uuid::new_v4());
    CartService::new(&env.ctx)
        .add_item(&owner, &env.selection(&van, d(6, 10), d(6, 12)))
        .await
        .unwrap();
    let group_id = CheckoutService::new(&env.ctx).checkout(&owner).await.unwrap().group.id;
    let reservations = ReservationService::new(&env.ctx);

    let stranger = Actor::customer(Uuid::new_v4());
    assert!(reservations.list_groups(&stranger).await.unwrap().is_empty());
    assert!(matches!(
        reservations.get_group(&stranger, group_id).await,
        Err(AppError::PermissionDenied(_))
    ));
    assert_eq!(reservations.list_groups(&owner).await.unwrap().len(), 1);
    assert_eq!(reservations.get_group(&env.staff, group_id).await.unwrap().group.user_id, owner.user_id);
}

#[tokio::test]
async fn test_vehicle_deletion_respects_blocking_reservations() {
    let env = setup().await;
    let van = env.add_van("Sprinter", 50).await;
    let customer = Actor::customer(Uuid::new_v4());
    CartService::new(&env.ctx)
        .add_item(&customer, &env.selection(&van, d(6, 10), d(6, 12)))
        .await
        .unwrap();
    let group_id = CheckoutService::new(&env.ctx).checkout(&customer).await.unwrap().group.id;
    let machine = StatusMachine::new(&env.ctx);
    let catalog = CatalogService::new(&env.ctx);

    machine.transition(group_id, "approve", &env.staff).await.unwrap();
    let err = catalog.delete_vehicle(&env.staff, van.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    let err = catalog.delete_location(&env.staff, env.depot.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    machine.transition(group_id, "complete", &env.staff).await.unwrap();
    catalog.delete_vehicle(&env.staff, van.id).await.unwrap();

    // El histórico conserva el nombre aunque pierde el vínculo
    let detail = ReservationService::new(&env.ctx).get_group(&customer, group_id).await.unwrap();
    assert_eq!(detail.reservations[0].vehicle_id, None);
    assert_eq!(detail.reservations[0].vehicle_name, "Sprinter");
}

#[tokio::test]
async fn test_overdue_intents_close_as_expired() {
    let env = setup().await;
    let van = env.add_van("Sprinter", 50).await;
    let customer = Actor::customer(Uuid::new_v4());
    CartService::new(&env.ctx)
        .add_item(&customer, &env.selection(&van, d(6, 10), d(6, 12)))
        .await
        .unwrap();
    let group_id = CheckoutService::new(&env.ctx).checkout(&customer).await.unwrap().group.id;
    StatusMachine::new(&env.ctx)
        .transition(group_id, "approve", &env.staff)
        .await
        .unwrap();
    let payments = PaymentService::new(&env.ctx);
    let first = payments.create_payment_intent(&customer, group_id).await.unwrap();

    // Nadie lee el primero antes de abrir el segundo
    env.clock.advance(Duration::minutes(45));
    let second = payments.create_payment_intent(&customer, group_id).await.unwrap();

    // El segundo vence y el grupo se cancela sin lecturas intermedias
    env.clock.advance(Duration::minutes(40));
    StatusMachine::new(&env.ctx)
        .transition(group_id, "cancel", &customer)
        .await
        .unwrap();

    assert_eq!(
        payments.get_payment_intent(&first.client_secret).await.unwrap().status,
        PaymentIntentStatus::Expired
    );
    assert_eq!(
        payments.get_payment_intent(&second.client_secret).await.unwrap().status,
        PaymentIntentStatus::Expired
    );
}

#[tokio::test]
async fn test_pending_group_with_deleted_vehicle_cannot_be_approved() {
    let env = setup().await;
    let van = env.add_van("Sprinter", 50).await;
    let customer = Actor::customer(Uuid::new_v4());
    CartService::new(&env.ctx)
        .add_item(&customer, &env.selection(&van, d(6, 10), d(6, 12)))
        .await
        .unwrap();
    let group_id = CheckoutService::new(&env.ctx).checkout(&customer).await.unwrap().group.id;

    // Un grupo pendiente no bloquea el borrado
    CatalogService::new(&env.ctx).delete_vehicle(&env.staff, van.id).await.unwrap();

    let err = StatusMachine::new(&env.ctx)
        .transition(group_id, "approve", &env.staff)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let detail = ReservationService::new(&env.ctx).get_group(&customer, group_id).await.unwrap();
    assert_eq!(detail.group.status, ReservationStatus::Pending);
    assert_eq!(detail.reservations[0].vehicle_id, None);

    let err = PaymentService::new(&env.ctx)
        .create_payment_intent(&customer, group_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn test_payment_refused_for_group_with_vehicle_less_line() {
    let env = setup().await;
    let van = env.add_van("Sprinter", 50).await;
    let customer = Actor::customer(Uuid::new_v4());
    CartService::new(&env.ctx)
        .add_item(&customer, &env.selection(&van, d(6, 10), d(6, 12)))
        .await
        .unwrap();
    let group_id = CheckoutService::new(&env.ctx).checkout(&customer).await.unwrap().group.id;
    StatusMachine::new(&env.ctx)
        .transition(group_id, "approve", &env.staff)
        .await
        .unwrap();
    let payments = PaymentService::new(&env.ctx);
    let intent = payments.create_payment_intent(&customer, group_id).await.unwrap();

    // Línea huérfana escrita directamente en el almacén
    let reservations = ReservationService::new(&env.ctx);
    let mut orphan = reservations.get_group(&customer, group_id).await.unwrap().reservations[0].clone();
    orphan.id = Uuid::new_v4();
    orphan.vehicle_id = None;
    orphan.vehicle_name = "Retired Transit".to_string();
    orphan.start_date = d(7, 1);
    orphan.end_date = d(7, 3);
    let mut tx = env.ctx.repo.begin().await.unwrap();
    tx.insert_reservation(&orphan).await.unwrap();
    tx.commit().await.unwrap();

    let err = payments
        .confirm(&MockCardGateway, &intent.client_secret, SUCCESS_CARD, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(ref message) if message.contains("Retired Transit")));

    let detail = reservations.get_group(&customer, group_id).await.unwrap();
    assert_eq!(detail.group.status, ReservationStatus::AwaitingPayment);
    assert_eq!(
        payments.get_payment_intent(&intent.client_secret).await.unwrap().status,
        PaymentIntentStatus::RequiresConfirmation
    );
}
