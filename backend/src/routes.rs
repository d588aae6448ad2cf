use std::collections::HashMap;

use actix_multipart::Multipart;
use actix_web::http::header::ContentDisposition;
use actix_web::{Error, HttpResponse, web};
use futures::{StreamExt, TryStreamExt};
use serde_json::json;
use shared::{Coordinates, OpenSurveyRequest, SurveyAck, SurveyCompleteRequest};

use crate::analysis::service::PlantAnalyzer;
use crate::error::ApiError;
use crate::storage::StorageError;
use crate::storage::accumulation::MAX_IMAGE_SIZE;
use crate::storage::artifact::report_file_name;
use crate::survey::aggregator::SurveyAggregator;

const MAX_TEXT_FIELD_SIZE: usize = 1024;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(health)))
        .service(web::resource("/analyze").route(web::post().to(analyze)))
        .service(web::resource("/generate_report").route(web::post().to(generate_report)))
        .service(web::resource("/rover/surveys").route(web::post().to(open_survey)))
        .service(web::resource("/rover/upload_image").route(web::post().to(upload_image)))
        .service(web::resource("/rover/survey_complete").route(web::post().to(survey_complete)))
        .service(web::resource("/rover/surveys/{survey_id}").route(web::get().to(survey_state)))
        .service(web::resource("/reports/{survey_id}").route(web::get().to(get_report)));
}

struct UploadedImage {
    filename: Option<String>,
    bytes: Vec<u8>,
}

/// Text fields by name, plus the `image` part if one was sent.
#[derive(Default)]
struct MultipartForm {
    fields: HashMap<String, String>,
    image: Option<UploadedImage>,
}

impl MultipartForm {
    fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn take_image(&mut self) -> Result<UploadedImage, ApiError> {
        self.image
            .take()
            .filter(|image| !image.bytes.is_empty())
            .ok_or_else(|| ApiError::InvalidRequest("Missing image file".into()))
    }

    fn coordinate(&self, name: &str) -> Result<i64, ApiError> {
        let raw = self
            .text(name)
            .ok_or_else(|| ApiError::InvalidRequest(format!("Missing field '{name}'")))?;
        raw.parse()
            .map_err(|_| ApiError::InvalidRequest(format!("Field '{name}' must be an integer")))
    }
}

/// Reads a multipart form holding at most one `image` part plus the named text fields.
/// Unknown or repeated fields are rejected, so the whole payload stays bounded.
async fn collect_form(
    mut payload: Multipart,
    text_fields: &[&str],
) -> Result<MultipartForm, Error> {
    let mut form = MultipartForm::default();

    while let Some(mut field) = payload.try_next().await? {
        let name = field.name().unwrap_or_default().to_string();
        let is_image = name == "image";
        if !is_image && !text_fields.contains(&name.as_str()) {
            return Err(ApiError::InvalidRequest(format!("Unexpected field '{name}'")).into());
        }
        if (is_image && form.image.is_some()) || form.fields.contains_key(&name) {
            return Err(ApiError::InvalidRequest(format!("Duplicate field '{name}'")).into());
        }

        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);
        let limit = if is_image { MAX_IMAGE_SIZE } else { MAX_TEXT_FIELD_SIZE };

        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk?;
            if data.len() + chunk.len() > limit {
                return Err(if is_image {
                    ApiError::from(StorageError::FileTooLarge)
                } else {
                    ApiError::InvalidRequest(format!("Field '{name}' is too long"))
                }
                .into());
            }
            data.extend_from_slice(&chunk);
        }

        if is_image {
            form.image = Some(UploadedImage {
                filename,
                bytes: data,
            });
        } else {
            form.fields
                .insert(name, String::from_utf8_lossy(&data).into_owned());
        }
    }

    Ok(form)
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "message": "AgriSense Backend is running." }))
}

async fn analyze(
    analyzer: web::Data<PlantAnalyzer>,
    payload: Multipart,
) -> Result<HttpResponse, Error> {
    let mut form = collect_form(payload, &["language_code", "row", "col"]).await?;
    let image = form.take_image()?;
    let coordinates = Coordinates {
        row: form.coordinate("row")?,
        col: form.coordinate("col")?,
    };

    let analysis = analyzer
        .analyze(&image.bytes, form.text("language_code"))
        .await
        .map_err(ApiError::from)?;
    log::info!(
        "Analyzed plant at ({}, {})",
        coordinates.row,
        coordinates.col
    );

    Ok(HttpResponse::Ok().json(analysis.into_response(coordinates)))
}

async fn generate_report(
    analyzer: web::Data<PlantAnalyzer>,
    payload: Multipart,
) -> Result<HttpResponse, Error> {
    let mut form = collect_form(payload, &["language_code"]).await?;
    let image = form.take_image()?;
    let language_code = form.text("language_code");

    let analysis = analyzer
        .analyze(&image.bytes, language_code)
        .await
        .map_err(ApiError::from)?;
    let pdf = analyzer
        .render(&analysis, language_code)
        .map_err(ApiError::from)?;

    Ok(HttpResponse::Ok()
        .content_type("application/pdf")
        .insert_header(ContentDisposition::attachment("AgriSense_Report.pdf"))
        .body(pdf))
}

async fn open_survey(
    aggregator: web::Data<SurveyAggregator>,
    request: web::Json<OpenSurveyRequest>,
) -> Result<HttpResponse, Error> {
    let survey_id = aggregator.open_survey(request.into_inner()).await?;
    Ok(HttpResponse::Ok().json(SurveyAck {
        status: "open".into(),
        message: format!("Survey {survey_id} is accepting images."),
    }))
}

async fn upload_image(
    aggregator: web::Data<SurveyAggregator>,
    payload: Multipart,
) -> Result<HttpResponse, Error> {
    let mut form = collect_form(payload, &["survey_id"]).await?;
    let image = form.take_image()?;
    let ack = aggregator
        .upload_image(
            form.text("survey_id"),
            image.filename.as_deref(),
            &image.bytes,
        )
        .await?;
    Ok(HttpResponse::Ok().json(ack))
}

async fn survey_complete(
    aggregator: web::Data<SurveyAggregator>,
    request: web::Json<SurveyCompleteRequest>,
) -> Result<HttpResponse, Error> {
    let job = aggregator.complete_survey(request.into_inner()).await?;
    Ok(HttpResponse::Ok().json(SurveyAck {
        status: "processing_started".into(),
        message: format!(
            "Survey {} is being processed in the background (job {}).",
            job.survey_id, job.id
        ),
    }))
}

async fn survey_state(
    aggregator: web::Data<SurveyAggregator>,
    path: web::Path<String>,
) -> Result<HttpResponse, Error> {
    let state = aggregator.survey_state(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(state))
}

async fn get_report(
    aggregator: web::Data<SurveyAggregator>,
    path: web::Path<String>,
) -> Result<HttpResponse, Error> {
    let survey_id = path.into_inner();
    let pdf = aggregator.report(&survey_id).await?;
    Ok(HttpResponse::Ok()
        .content_type("application/pdf")
        .insert_header(ContentDisposition::attachment(report_file_name(&survey_id)))
        .body(pdf))
}
