//! DevGuard REST 클라이언트
//!
//! 상태 코드 매핑:
//! - 404 → `CatalogError::NotFound`
//! - 그 밖의 비성공 → `CatalogError::Status`
//! - 전송 실패 → `CatalogError::Transport`
//! - 본문 디코딩 실패 → `CatalogError::Decode`

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::trace;

use sbomsync_core::error::CatalogError;

use crate::config::DevGuardTargetConfig;
use crate::error::DevGuardError;
use crate::model::{Asset, NewAsset, NewProject, Project};

/// 업로드 요청 헤더
#[derive(Debug, Clone)]
pub struct ScanUpload<'a> {
    /// `<org>/projects/<project>/assets/<asset>`
    pub asset_name: &'a str,
    /// 에셋 버전
    pub asset_version: &'a str,
    /// 스캐너 ID
    pub scanner: &'a str,
}

/// 조직 하나에 대한 DevGuard API 클라이언트
#[derive(Debug, Clone)]
pub struct DevGuardClient {
    http: reqwest::Client,
    base_url: String,
    organization: String,
}

impl DevGuardClient {
    /// 설정으로 클라이언트를 만듭니다. 모든 요청에 베어러 토큰이 붙습니다.
    pub fn new(config: &DevGuardTargetConfig) -> Result<Self, DevGuardError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.token)).map_err(|_| {
            DevGuardError::Config {
                field: "token".to_owned(),
                reason: "contains characters not allowed in an http header".to_owned(),
            }
        })?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| DevGuardError::Client(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.api_url.clone(),
            organization: config.organization.clone(),
        })
    }

    fn projects_url(&self) -> String {
        format!(
            "{}/api/v1/organizations/{}/projects/",
            self.base_url, self.organization
        )
    }

    fn project_url(&self, project: &str) -> String {
        format!("{}{project}/", self.projects_url())
    }

    fn assets_url(&self, project: &str) -> String {
        format!("{}assets/", self.project_url(project))
    }

    fn asset_url(&self, project: &str, asset: &str) -> String {
        format!("{}{asset}/", self.assets_url(project))
    }

    /// 프로젝트를 슬러그로 조회합니다.
    pub async fn get_project(&self, slug: &str) -> Result<Project, CatalogError> {
        let operation = format!("get project {slug}");
        let resp = send(&operation, self.http.get(self.project_url(slug))).await?;
        decode(&operation, resp).await
    }

    /// 상위 프로젝트 ID로 하위 프로젝트를 나열합니다.
    pub async fn list_child_projects(&self, parent_id: &str) -> Result<Vec<Project>, CatalogError> {
        let operation = "list child projects";
        let req = self
            .http
            .get(self.projects_url())
            .query(&[("parentId", parent_id)]);
        let resp = send(operation, req).await?;
        decode(operation, resp).await
    }

    /// 프로젝트를 생성합니다.
    pub async fn create_project(&self, body: &NewProject) -> Result<Project, CatalogError> {
        let operation = format!("create project {}", body.name);
        let resp = send(&operation, self.http.post(self.projects_url()).json(body)).await?;
        decode(&operation, resp).await
    }

    /// 프로젝트를 부분 수정합니다.
    pub async fn patch_project<B: Serialize + ?Sized>(
        &self,
        slug: &str,
        body: &B,
    ) -> Result<(), CatalogError> {
        let operation = format!("patch project {slug}");
        send(&operation, self.http.patch(self.project_url(slug)).json(body)).await?;
        Ok(())
    }

    /// 프로젝트를 삭제합니다.
    pub async fn delete_project(&self, slug: &str) -> Result<(), CatalogError> {
        let operation = format!("delete project {slug}");
        send(&operation, self.http.delete(self.project_url(slug))).await?;
        Ok(())
    }

    /// 프로젝트의 에셋을 나열합니다.
    pub async fn list_assets(&self, project: &str) -> Result<Vec<Asset>, CatalogError> {
        let operation = format!("list assets of {project}");
        let resp = send(&operation, self.http.get(self.assets_url(project))).await?;
        decode(&operation, resp).await
    }

    /// 에셋을 슬러그로 조회합니다.
    pub async fn get_asset(&self, project: &str, slug: &str) -> Result<Asset, CatalogError> {
        let operation = format!("get asset {project}/{slug}");
        let resp = send(&operation, self.http.get(self.asset_url(project, slug))).await?;
        decode(&operation, resp).await
    }

    /// 에셋을 생성합니다.
    pub async fn create_asset(&self, project: &str, body: &NewAsset) -> Result<Asset, CatalogError> {
        let operation = format!("create asset {project}/{}", body.name);
        let resp = send(&operation, self.http.post(self.assets_url(project)).json(body)).await?;
        decode(&operation, resp).await
    }

    /// 에셋을 부분 수정합니다.
    pub async fn patch_asset<B: Serialize + ?Sized>(
        &self,
        project: &str,
        slug: &str,
        body: &B,
    ) -> Result<(), CatalogError> {
        let operation = format!("patch asset {project}/{slug}");
        send(&operation, self.http.patch(self.asset_url(project, slug)).json(body)).await?;
        Ok(())
    }

    /// 에셋을 삭제합니다.
    pub async fn delete_asset(&self, project: &str, slug: &str) -> Result<(), CatalogError> {
        let operation = format!("delete asset {project}/{slug}");
        send(&operation, self.http.delete(self.asset_url(project, slug))).await?;
        Ok(())
    }

    /// SBOM을 업로드합니다.
    pub async fn upload_scan(&self, upload: &ScanUpload<'_>, sbom: String) -> Result<(), CatalogError> {
        let operation = format!("upload scan for {}", upload.asset_name);
        let req = self
            .http
            .post(format!("{}/api/v1/scan/", self.base_url))
            .header("X-Asset-Name", upload.asset_name)
            .header("X-Asset-Version", upload.asset_version)
            .header("X-Scan-Type", "container-scanning")
            .header("X-Scanner", upload.scanner)
            .header("X-Risk-Management", "true")
            .body(sbom);
        send(&operation, req).await?;
        Ok(())
    }
}

async fn send(operation: &str, req: RequestBuilder) -> Result<Response, CatalogError> {
    let resp = req.send().await.map_err(|e| CatalogError::Transport {
        operation: operation.to_owned(),
        reason: e.to_string(),
    })?;

    let status = resp.status();
    trace!(operation, status = status.as_u16(), "devguard response");
    if status == StatusCode::NOT_FOUND {
        return Err(CatalogError::NotFound {
            resource: operation.to_owned(),
        });
    }
    if !status.is_success() {
        return Err(CatalogError::Status {
            operation: operation.to_owned(),
            status: status.as_u16(),
        });
    }
    Ok(resp)
}

async fn decode<T: DeserializeOwned>(operation: &str, resp: Response) -> Result<T, CatalogError> {
    resp.json::<T>().await.map_err(|e| CatalogError::Decode {
        operation: operation.to_owned(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DevGuardTargetConfigBuilder;

    fn client() -> DevGuardClient {
        let config = DevGuardTargetConfigBuilder::new()
            .api_url("http://devguard.local")
            .token("secret")
            .project_name("acme/projects/cluster")
            .build()
            .unwrap();
        DevGuardClient::new(&config).unwrap()
    }

    #[test]
    fn urls_follow_organization_layout() {
        let client = client();
        assert_eq!(
            client.project_url("payments"),
            "http://devguard.local/api/v1/organizations/acme/projects/payments/"
        );
        assert_eq!(
            client.asset_url("payments", "registry-io-app"),
            "http://devguard.local/api/v1/organizations/acme/projects/payments/assets/registry-io-app/"
        );
    }

    #[test]
    fn token_with_newline_is_rejected() {
        let mut config = DevGuardTargetConfigBuilder::new()
            .token("secret")
            .project_name("acme/projects/cluster")
            .build()
            .unwrap();
        config.token = "bad\ntoken".to_owned();
        assert!(DevGuardClient::new(&config).is_err());
    }
}
