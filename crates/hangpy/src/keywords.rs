//! Localized keyword table and the guest bootstrap scripts built from it.

use std::{fmt::Write as _, path::PathBuf};

use tracing::{Instrument, debug, info_span};
use url::Url;

use crate::{Error, Result, TRACE_TARGET_SCRIPT};

/// A localized guest name and the guest expression it aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keyword {
    pub alias: &'static str,
    pub expr: &'static str,
    /// Shown by the guest help listing.
    pub origin: &'static str,
}

const fn kw(alias: &'static str, expr: &'static str, origin: &'static str) -> Keyword {
    Keyword {
        alias,
        expr,
        origin,
    }
}

const USER_DEFINED: &str = "lambda (사용자 정의)";

pub const BUILTIN_KEYWORDS: &[Keyword] = &[
    // io
    kw("출력", "print", "print"),
    kw("입력", "input", "input"),
    kw("열기", "open", "open"),
    kw("닫기", "lambda f: f.close()", USER_DEFINED),
    // types
    kw("정수", "int", "int"),
    kw("실수", "float", "float"),
    kw("문자열", "str", "str"),
    kw("부울", "bool", "bool"),
    kw("목록", "list", "list"),
    kw("집합", "set", "set"),
    kw("사전", "dict", "dict"),
    kw("튜플", "tuple", "tuple"),
    // constants and flow helpers
    kw("참", "True", "True"),
    kw("거짓", "False", "False"),
    kw("없음", "None", "None"),
    kw(
        "만약",
        "lambda cond, 참값, 거짓값=None: (참값 if cond else 거짓값)",
        USER_DEFINED,
    ),
    // iteration
    kw("반복범위", "range", "range"),
    kw("반복", "lambda n, f: [f(i) for i in range(n)]", USER_DEFINED),
    kw("모두", "all", "all"),
    kw("하나라도", "any", "any"),
    // sequences
    kw("길이", "len", "len"),
    kw("합계", "sum", "sum"),
    kw("최대", "max", "max"),
    kw("최소", "min", "min"),
    kw("추가", "lambda lst, v: lst.append(v)", USER_DEFINED),
    kw(
        "제거",
        "lambda lst, v=None: (lst.remove(v) if v is not None else lst.pop())",
        USER_DEFINED,
    ),
    kw(
        "정렬",
        "lambda lst, 역순=False: lst.sort(reverse=역순)",
        USER_DEFINED,
    ),
    kw(
        "정렬된",
        "lambda lst, 역순=False: sorted(lst, reverse=역순)",
        USER_DEFINED,
    ),
    kw("평균", "lambda a: (sum(a) / len(a)) if a else 0", USER_DEFINED),
    // strings
    kw("나누기", "lambda s, sep=None: s.split(sep)", USER_DEFINED),
    kw("합치기", "lambda lst, sep=\"\": sep.join(lst)", USER_DEFINED),
    kw("대문자변경", "lambda s: s.upper()", USER_DEFINED),
    kw("소문자변경", "lambda s: s.lower()", USER_DEFINED),
    kw("바꾸기", "lambda s, a, b: s.replace(a, b)", USER_DEFINED),
    kw("찾기", "lambda s, x: s.find(x)", USER_DEFINED),
    kw("포함됨", "lambda s, x: (x in s)", USER_DEFINED),
    // math, random, time
    kw("제곱", "lambda x: x**2", USER_DEFINED),
    kw("제곱근", "math.sqrt", "math.sqrt"),
    kw("절댓값", "abs", "abs"),
    kw("올림", "math.ceil", "math.ceil"),
    kw("내림", "math.floor", "math.floor"),
    kw("반올림", "round", "round"),
    kw("사인", "math.sin", "math.sin"),
    kw("코사인", "math.cos", "math.cos"),
    kw("탄젠트", "math.tan", "math.tan"),
    kw("파이", "math.pi", "math.pi"),
    kw("무작위", "random", "random (module)"),
    kw("지금", "datetime.datetime.now", "datetime.now"),
    kw("대기", "time.sleep", "time.sleep"),
    // files and os
    kw("현재경로", "os.getcwd", "os.getcwd"),
    kw("경로변경", "os.chdir", "os.chdir"),
    kw("파일삭제", "os.remove", "os.remove"),
    kw("폴더목록", "os.listdir", "os.listdir"),
    kw("만들기", "os.mkdir", "os.mkdir"),
    // system
    kw("종료", "sys.exit", "sys.exit"),
];

pub const HELP_FUNCTION: &str = "도움말";

/// Render the keyword table as a guest script.
///
/// Every alias is bound in the guest global scope unless a builtin or a
/// global of that name already exists, and a help function listing the
/// aliases is defined.
#[must_use]
pub fn render_keyword_script(keywords: &[Keyword]) -> String {
    let mut out = String::from(
        "import builtins\nimport datetime\nimport math\nimport os\nimport random\nimport sys\nimport time\n\n_HANGPY_KEYWORDS = {\n",
    );
    for keyword in keywords {
        let _ = writeln!(
            out,
            "    {}: ({}, {}),",
            py_str(keyword.alias),
            keyword.expr,
            py_str(keyword.origin)
        );
    }
    out.push_str(
        "}\n\
         for _name, (_value, _origin) in _HANGPY_KEYWORDS.items():\n\
         \x20   if not hasattr(builtins, _name) and _name not in globals():\n\
         \x20       globals()[_name] = _value\n\n",
    );
    let _ = write!(
        out,
        "def {HELP_FUNCTION}():\n\
         \x20   print(\"사용 가능한 한글 명령어:\")\n\
         \x20   for _name in sorted(_HANGPY_KEYWORDS):\n\
         \x20       print(f\"· {{_name:<10}} → {{_HANGPY_KEYWORDS[_name][1]}}\")\n"
    );
    out
}

/// Guest script shadowing the built-in line input with an async function
/// that awaits the host-bound `bridge_function`.
///
/// It runs before the keyword script, so an alias of `input` resolves to
/// the same function.
#[must_use]
pub fn input_override_script(bridge_function: &str) -> String {
    format!(
        "async def _hangpy_input(prompt=\"\"):\n\
         \x20   return await {bridge_function}(str(prompt))\n\n\
         input = _hangpy_input\n"
    )
}

fn py_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Where the keyword-mapping script comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeywordSource {
    Builtin,
    File(PathBuf),
    Url(Url),
}

impl KeywordSource {
    /// `builtin`, an `http(s)://` URL, or a file path.
    ///
    /// # Errors
    /// Returns [`Error::Config`] for an unparsable URL.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("builtin") {
            return Ok(Self::Builtin);
        }
        if s.starts_with("http://") || s.starts_with("https://") {
            return Url::parse(s)
                .map(Self::Url)
                .map_err(|e| Error::Config(format!("invalid keyword url {s}: {e}")));
        }
        Ok(Self::File(PathBuf::from(s)))
    }

    /// Fetch the keyword-mapping script text.
    ///
    /// # Errors
    /// Returns [`Error::Fetch`] for network failures or non-success
    /// statuses, [`Error::Io`] for unreadable files.
    pub async fn load(&self) -> Result<String> {
        let span = info_span!(target: TRACE_TARGET_SCRIPT, "keywords.load");
        async move {
            match self {
                Self::Builtin => Ok(render_keyword_script(BUILTIN_KEYWORDS)),
                Self::File(path) => {
                    debug!(target: TRACE_TARGET_SCRIPT, path = %path.display(), "reading keyword file");
                    Ok(tokio::fs::read_to_string(path).await?)
                }
                Self::Url(url) => fetch(url).await,
            }
        }
        .instrument(span)
        .await
    }
}

async fn fetch(url: &Url) -> Result<String> {
    let fail = |reason: String| Error::Fetch {
        url: url.to_string(),
        reason,
    };
    debug!(target: TRACE_TARGET_SCRIPT, %url, "fetching keyword script");
    let response = reqwest::Client::new()
        .get(url.clone())
        .header(reqwest::header::CACHE_CONTROL, "no-store")
        .send()
        .await
        .map_err(|e| fail(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(fail(format!("status {}", status.as_u16())));
    }
    response.text().await.map_err(|e| fail(e.to_string()))
}
