//! 이미지 참조 파싱, 레지스트리 프록시 정규화, 식별자 추출
//!
//! [`normalize`]는 순수 함수입니다. 파싱에 실패하면 [`ImageParseError`]를
//! 반환하며, 호출자는 원본 참조를 그대로 사용해야 합니다.

use std::fmt;

use crate::error::ImageParseError;
use crate::types::ImageIdentity;

/// 레지스트리가 생략된 참조의 기본 레지스트리
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// 태그가 없는 참조의 기본 버전
pub const DEFAULT_VERSION: &str = "latest";

const OFFICIAL_IMAGE_PREFIX: &str = "library/";

/// 파싱된 이미지 참조
///
/// `[registry/]path[:tag][@digest]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// 명시된 레지스트리 호스트 (생략 시 `None`)
    pub registry: Option<String>,
    /// 저장소 경로
    pub path: String,
    /// 태그
    pub tag: Option<String>,
    /// 다이제스트 (`sha256:...`)
    pub digest: Option<String>,
}

impl ImageReference {
    /// 이미지 참조 문자열을 파싱합니다.
    pub fn parse(raw: &str) -> Result<Self, ImageParseError> {
        let fail = |reason: &str| ImageParseError {
            reference: raw.to_owned(),
            reason: reason.to_owned(),
        };

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(fail("empty reference"));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(fail("reference contains whitespace"));
        }

        let (name_and_tag, digest) = match trimmed.split_once('@') {
            Some((name, digest)) => {
                validate_digest(digest).map_err(|reason| fail(&reason))?;
                (name, Some(digest.to_owned()))
            }
            None => (trimmed, None),
        };

        let last_slash = name_and_tag.rfind('/').map_or(0, |idx| idx + 1);
        let (name, tag) = match name_and_tag[last_slash..].rfind(':') {
            Some(colon) => {
                let split = last_slash + colon;
                let tag = &name_and_tag[split + 1..];
                validate_tag(tag).map_err(|reason| fail(&reason))?;
                (&name_and_tag[..split], Some(tag.to_owned()))
            }
            None => (name_and_tag, None),
        };

        if name.is_empty() {
            return Err(fail("missing repository name"));
        }

        let (registry, path) = match name.split_once('/') {
            Some((first, rest)) if is_registry_host(first) => {
                validate_registry(first).map_err(|reason| fail(&reason))?;
                (Some(first.to_owned()), rest)
            }
            _ => (None, name),
        };

        for component in path.split('/') {
            validate_path_component(component).map_err(|reason| fail(&reason))?;
        }

        Ok(Self {
            registry,
            path: path.to_owned(),
            tag,
            digest,
        })
    }

    /// 레지스트리 (생략 시 `docker.io`)
    pub fn effective_registry(&self) -> &str {
        self.registry.as_deref().unwrap_or(DEFAULT_REGISTRY)
    }

    /// 태그와 다이제스트를 제외한 이름
    pub fn name(&self) -> String {
        match &self.registry {
            Some(registry) => format!("{registry}/{}", self.path),
            None => self.path.clone(),
        }
    }

    /// 업로드 메타데이터용 버전: 태그, 다이제스트, `latest` 순서
    pub fn version(&self) -> &str {
        self.tag
            .as_deref()
            .or(self.digest.as_deref())
            .unwrap_or(DEFAULT_VERSION)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())?;
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")
        } else if let Some(tag) = &self.tag {
            write!(f, ":{tag}")
        } else {
            Ok(())
        }
    }
}

/// 레지스트리 호스트 → 프록시 호스트 매핑
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryProxyMap {
    entries: Vec<(String, String)>,
}

impl RegistryProxyMap {
    /// `from=to` 형식의 항목 목록을 파싱합니다.
    pub fn parse(entries: &[String]) -> Result<Self, String> {
        let mut parsed = Vec::with_capacity(entries.len());
        for entry in entries {
            let (from, to) = entry
                .split_once('=')
                .ok_or_else(|| format!("'{entry}' must have the form <registry>=<proxy>"))?;
            let (from, to) = (from.trim(), to.trim());
            if from.is_empty() || to.is_empty() {
                return Err(format!("'{entry}' has an empty registry or proxy"));
            }
            parsed.push((from.to_owned(), to.to_owned()));
        }
        Ok(Self { entries: parsed })
    }

    /// 단일 매핑을 추가합니다.
    pub fn with_proxy(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.entries.push((from.into(), to.into()));
        self
    }

    /// 레지스트리에 대응하는 프록시
    pub fn proxy_for(&self, registry: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(from, _)| from == registry)
            .map(|(_, to)| to.as_str())
    }

    /// 매핑이 비어 있는지 여부
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 레지스트리 호스트를 프록시로 치환한 참조를 반환합니다.
///
/// 매핑이 없으면 입력을 그대로 반환합니다. 다이제스트가 있으면 `@digest`,
/// 태그만 있으면 `:tag`를 유지합니다.
pub fn normalize(raw: &str, proxies: &RegistryProxyMap) -> Result<String, ImageParseError> {
    let reference = ImageReference::parse(raw)?;
    let registry = reference.effective_registry();
    let Some(proxy) = proxies.proxy_for(registry) else {
        return Ok(raw.trim().to_owned());
    };

    let path = if registry == DEFAULT_REGISTRY {
        reference
            .path
            .strip_prefix(OFFICIAL_IMAGE_PREFIX)
            .unwrap_or(&reference.path)
    } else {
        reference.path.as_str()
    };

    let rewritten = ImageReference {
        registry: Some(proxy.to_owned()),
        path: path.to_owned(),
        tag: if reference.digest.is_some() {
            None
        } else {
            reference.tag.clone()
        },
        digest: reference.digest.clone(),
    };
    Ok(rewritten.to_string())
}

/// 태그와 다이제스트를 제거한 저장소 이름
///
/// 파싱할 수 없는 참조에도 동작합니다.
pub fn strip_version(reference: &str) -> &str {
    let reference = reference.trim();
    let without_digest = reference.split_once('@').map_or(reference, |(name, _)| name);
    let last_slash = without_digest.rfind('/').map_or(0, |idx| idx + 1);
    match without_digest[last_slash..].rfind(':') {
        Some(colon) => &without_digest[..last_slash + colon],
        None => without_digest,
    }
}

/// 참조와 네임스페이스로 [`ImageIdentity`]를 만듭니다.
pub fn identity_of(reference: &str, namespace: &str) -> ImageIdentity {
    ImageIdentity::new(namespace, strip_version(reference))
}

/// 참조의 버전. 파싱에 실패하면 `latest`.
pub fn version_of(reference: &str) -> String {
    ImageReference::parse(reference)
        .map(|r| r.version().to_owned())
        .unwrap_or_else(|_| DEFAULT_VERSION.to_owned())
}

fn is_registry_host(component: &str) -> bool {
    component.contains('.') || component.contains(':') || component == "localhost"
}

fn validate_registry(host: &str) -> Result<(), String> {
    let (name, port) = match host.split_once(':') {
        Some((name, port)) => (name, Some(port)),
        None => (host, None),
    };
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return Err(format!("invalid registry host '{host}'"));
    }
    if let Some(port) = port
        && (port.is_empty() || !port.chars().all(|c| c.is_ascii_digit()))
    {
        return Err(format!("invalid registry port in '{host}'"));
    }
    Ok(())
}

fn validate_path_component(component: &str) -> Result<(), String> {
    let valid_chars = component
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'));
    let starts_ok = component
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    if !valid_chars || !starts_ok {
        return Err(format!("invalid repository path component '{component}'"));
    }
    Ok(())
}

fn validate_tag(tag: &str) -> Result<(), String> {
    let valid = !tag.is_empty()
        && tag.len() <= 128
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        && !tag.starts_with(['.', '-']);
    if valid {
        Ok(())
    } else {
        Err(format!("invalid tag '{tag}'"))
    }
}

fn validate_digest(digest: &str) -> Result<(), String> {
    let Some((algorithm, hex)) = digest.split_once(':') else {
        return Err(format!("digest '{digest}' is missing an algorithm"));
    };
    let valid = !algorithm.is_empty()
        && algorithm.chars().all(|c| c.is_ascii_alphanumeric())
        && !hex.is_empty()
        && hex.chars().all(|c| c.is_ascii_hexdigit());
    if valid {
        Ok(())
    } else {
        Err(format!("invalid digest '{digest}'"))
    }
}
