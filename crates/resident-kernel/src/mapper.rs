//! Transport request to native request.

use std::io;

use resident_core::{
    header_names, IncomingRequest, NativeRequest, RequestConstructor, RequestParts, TrustPolicy,
    UploadStatus, UploadedFile, UploadedFileDescriptor,
};
use resident_quarantine::UploadJanitor;
use resident_session::SessionContext;
use tracing::debug;

use crate::config::UploadConfig;
use crate::error::RequestError;

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Builds native requests for one bootstrapped application.
#[derive(Debug, Clone)]
pub struct RequestMapper {
    constructor: RequestConstructor,
    uploads: UploadConfig,
    trust: TrustPolicy,
}

impl RequestMapper {
    /// Create a mapper.
    pub fn new(constructor: RequestConstructor, uploads: UploadConfig, trust: TrustPolicy) -> Self {
        Self {
            constructor,
            uploads,
            trust,
        }
    }

    /// Map `request`.
    ///
    /// Primes the session identity from the request's session cookie, reads
    /// the body, decodes urlencoded forms and writes every supplied upload to
    /// a temporary file. Each temporary file is handed to `janitor` as soon
    /// as it exists. Fields where no file was chosen map to `None`.
    pub async fn map(
        &self,
        request: IncomingRequest,
        session: &mut SessionContext,
        janitor: &mut UploadJanitor,
    ) -> Result<NativeRequest, RequestError> {
        let cookies = request.all_cookies();
        let session_cookie = cookies
            .iter()
            .rev()
            .find(|(name, _)| name == session.cookie_name())
            .map(|(_, value)| value.as_str());
        let outcome = session.prime(session_cookie);
        debug!(?outcome, "session identity primed");

        let IncomingRequest {
            method,
            path,
            query,
            headers,
            form_fields,
            body,
            files,
            remote_addr,
            ..
        } = request;

        let body = body.collect().await?;

        let mut form = Vec::new();
        if headers
            .get(header_names::CONTENT_TYPE)
            .is_some_and(is_urlencoded)
        {
            form.extend(url::form_urlencoded::parse(&body).into_owned());
        }
        form.extend(form_fields);

        let mut mapped = Vec::with_capacity(files.len());
        for file in files {
            let descriptor = match file.status {
                UploadStatus::NoFile => None,
                _ => Some(self.materialize(&file, janitor).await?),
            };
            mapped.push((file.field, descriptor));
        }

        let parts = RequestParts {
            method,
            path,
            query,
            form,
            cookies,
            files: mapped,
            headers,
            body,
            remote_addr,
            trust: self.trust.clone(),
        };
        Ok((self.constructor)(parts))
    }

    async fn materialize(
        &self,
        file: &UploadedFile,
        janitor: &mut UploadJanitor,
    ) -> io::Result<UploadedFileDescriptor> {
        let path = tempfile::Builder::new()
            .prefix(&self.uploads.prefix)
            .tempfile_in(self.uploads.dir())?
            .into_temp_path()
            .keep()?;
        janitor.track(path.clone());

        tokio::fs::write(&path, &file.content).await?;
        debug!(field = %file.field, path = %path.display(), "upload materialized");

        Ok(UploadedFileDescriptor {
            client_filename: file.filename.clone(),
            media_type: file.media_type.clone(),
            size: file.size(),
            status: file.status,
            path,
        })
    }
}

fn is_urlencoded(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|media| media.trim().eq_ignore_ascii_case(FORM_URLENCODED))
}
