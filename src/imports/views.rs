use crate::common::auth::{CurrentUser, protect};
use crate::common::errors::BusinessResult;
use crate::common::state::AppState;
use crate::services::processing::{
    database::DatabaseOperations,
    import_pipeline::{ImportPipeline, ImportReport, ImportRequest, UploadedFile},
    template::{TEMPLATE_FILE_NAME, build_template},
};
use crate::validation_error;
use axum::{
    Extension, Json,
    extract::{Multipart, State},
    http::header,
    response::{IntoResponse, Response},
};
use utoipa_axum::{router::OpenApiRouter, routes};

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

pub fn router(state: &AppState) -> OpenApiRouter {
    let router = OpenApiRouter::new()
        .routes(routes!(import_spreadsheets))
        .routes(routes!(download_template))
        .with_state(state.clone());

    protect(router, state, "imports")
}

/// Import one or more spreadsheets into a new experiment
#[utoipa::path(
    post,
    path = "/",
    request_body(
        content = String,
        description = "multipart/form-data with experiment_name, optional description, device_address and device_type, and one or more files/file parts",
        content_type = "multipart/form-data"
    ),
    responses(
        (status = 200, description = "Per-file import report", body = ImportReport),
        (status = 400, description = "Missing experiment name, no files or malformed multipart body"),
        (status = 403, description = "Researcher role required")
    ),
    tag = "imports"
)]
pub async fn import_spreadsheets(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> BusinessResult<Json<ImportReport>> {
    let mut request = ImportRequest {
        operator_id: user.id,
        operator_name: user.name.clone(),
        ..Default::default()
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| validation_error!("multipart", e))?
    {
        let field_name = field.name().unwrap_or_default().to_string();

        if field_name == "files" || field_name == "file" {
            let file_name = field.file_name().map_or_else(
                || format!("file-{}", request.files.len() + 1),
                ToString::to_string,
            );
            let data = field
                .bytes()
                .await
                .map_err(|e| validation_error!(field_name, e))?
                .to_vec();
            request.files.push(UploadedFile { file_name, data });
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| validation_error!(field_name, e))?;
        match field_name.as_str() {
            "experiment_name" => request.experiment_name = value,
            "description" => request.description = Some(value),
            "device_address" => request.device_address = Some(value),
            "device_type" => request.device_type = Some(value),
            other => tracing::debug!("Ignoring multipart field '{other}'"),
        }
    }

    let settings = state.config.import;
    let pipeline = ImportPipeline::new(
        DatabaseOperations::new(state.db.clone(), settings.atomic_files),
        state.events.clone(),
        settings,
        state.current_thresholds().await,
    );

    Ok(Json(pipeline.run(request).await?))
}

/// Download the spreadsheet template with the recognised column headers
#[utoipa::path(
    get,
    path = "/template",
    responses(
        (status = 200, description = "xlsx template", content_type = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet", body = Vec<u8>)
    ),
    tag = "imports"
)]
pub async fn download_template() -> BusinessResult<Response> {
    let workbook = build_template()?;
    Ok((
        [
            (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{TEMPLATE_FILE_NAME}\""),
            ),
        ],
        workbook,
    )
        .into_response())
}
