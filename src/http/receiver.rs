use crate::services::receiver::ReceiverSupervisor;
use actix_web::web::Data;
use actix_web::{HttpResponse, Responder};

pub(crate) async fn receiver_status(supervisor: Data<ReceiverSupervisor>) -> impl Responder {
    HttpResponse::Ok().json(supervisor.status())
}

pub(crate) async fn start_receiver(supervisor: Data<ReceiverSupervisor>) -> impl Responder {
    HttpResponse::Accepted().json(supervisor.start())
}

pub(crate) async fn stop_receiver(supervisor: Data<ReceiverSupervisor>) -> impl Responder {
    HttpResponse::Ok().json(supervisor.stop().await)
}

/// Leaves `Failed` and starts over with a fresh attempt counter.
pub(crate) async fn retry_receiver(supervisor: Data<ReceiverSupervisor>) -> impl Responder {
    HttpResponse::Accepted().json(supervisor.retry())
}
