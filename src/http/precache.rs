use crate::services::precache::PrecacheTrigger;
use actix_web::web::Data;
use actix_web::{HttpResponse, Responder};

pub(crate) async fn request_precache(trigger: Data<Option<PrecacheTrigger>>) -> impl Responder {
    match trigger.get_ref() {
        Some(trigger) => {
            trigger.trigger();
            HttpResponse::Accepted().finish()
        }
        None => HttpResponse::ServiceUnavailable().body("Precache is disabled"),
    }
}
