// Phase 2: コンテンツストリーム ⇔ フラットなトークン列

use lopdf::{Object, Stream};
use lopdf::content::{Content, Operation};

use crate::error::PdfMonoError;

/// コンテンツストリームの1トークン。
///
/// lopdfのOperation（オペランド列 + オペレータ）を平坦化したもの。
/// オペランドは常にオペレータの直前に連続して並ぶ。
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Operator(String),
    Number(f64),
    Name(String),
    Other(Object),
}

impl Token {
    pub fn operator(name: &str) -> Self {
        Token::Operator(name.to_string())
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Token::Number(v) => Some(*v),
            _ => None,
        }
    }

    fn from_object(obj: Object) -> Self {
        match obj {
            Object::Integer(i) => Token::Number(i as f64),
            Object::Real(r) => Token::Number(r as f64),
            Object::Name(name) => Token::Name(String::from_utf8_lossy(&name).into_owned()),
            other => Token::Other(other),
        }
    }

    /// オペランドをlopdfのObjectに戻す。整数値の数値はIntegerとして出力する。
    fn into_object(self) -> crate::error::Result<Object> {
        match self {
            Token::Number(v) => {
                if v.fract() == 0.0 && v.abs() < i32::MAX as f64 {
                    Ok(Object::Integer(v as i64))
                } else {
                    Ok(Object::Real(v as f32))
                }
            }
            Token::Name(name) => Ok(Object::Name(name.into_bytes())),
            Token::Other(obj) => Ok(obj),
            Token::Operator(name) => Err(PdfMonoError::content_stream(format!(
                "operator '{name}' cannot be used as an operand"
            ))),
        }
    }
}

/// コンテンツストリームのバイト列をトークン列に分解する。
pub fn tokenize(content_bytes: &[u8]) -> crate::error::Result<Vec<Token>> {
    // 空バイト列の場合、lopdfのパーサがエラーを返す可能性があるため特別扱い
    if content_bytes.is_empty() {
        return Ok(Vec::new());
    }

    let content = Content::decode(content_bytes)
        .map_err(|e| PdfMonoError::content_stream(e.to_string()))?;

    Ok(operations_to_tokens(content.operations))
}

/// lopdfのOperation列をトークン列に平坦化する。
pub fn operations_to_tokens(operations: Vec<Operation>) -> Vec<Token> {
    let mut tokens = Vec::new();
    for op in operations {
        tokens.extend(op.operands.into_iter().map(Token::from_object));
        tokens.push(Token::Operator(op.operator));
    }
    tokens
}

/// トークン列をOperation列に再構成する。
///
/// 最後のオペレータの後にオペランドが残っている場合はStructuralError。
pub fn tokens_to_operations(tokens: Vec<Token>) -> crate::error::Result<Vec<Operation>> {
    let mut operations = Vec::new();
    let mut pending: Vec<Object> = Vec::new();

    for token in tokens {
        match token {
            Token::Operator(name) => {
                operations.push(Operation::new(&name, std::mem::take(&mut pending)));
            }
            operand => pending.push(operand.into_object()?),
        }
    }

    if !pending.is_empty() {
        return Err(PdfMonoError::structural(format!(
            "{} operand(s) left without an operator at end of content stream",
            pending.len()
        )));
    }

    Ok(operations)
}

/// トークン列をコンテンツストリームのバイト列にエンコードする。
///
/// インライン画像（`BI` + Streamオペランド）はlopdfのエンコーダに渡すと
/// `stream ... endstream BI` になってしまうため、`BI ... ID ... EI` の形で
/// 自前で書き出す。それ以外のオペレータはlopdfに任せる。
pub fn encode_tokens(tokens: Vec<Token>) -> crate::error::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut run = Vec::new();
    for operation in tokens_to_operations(tokens)? {
        if let Some(image) = inline_image(&operation) {
            append_line(&mut buffer, &encode_operations(std::mem::take(&mut run))?);
            append_line(&mut buffer, &encode_inline_image(image)?);
        } else {
            run.push(operation);
        }
    }
    append_line(&mut buffer, &encode_operations(run)?);
    Ok(buffer)
}

fn inline_image(operation: &Operation) -> Option<&Stream> {
    match operation.operands.as_slice() {
        [Object::Stream(image)] if operation.operator == "BI" => Some(image),
        _ => None,
    }
}

fn append_line(buffer: &mut Vec<u8>, bytes: &[u8]) {
    if bytes.is_empty() {
        return;
    }
    if !buffer.is_empty() {
        buffer.push(b'\n');
    }
    buffer.extend_from_slice(bytes);
}

fn encode_operations(operations: Vec<Operation>) -> crate::error::Result<Vec<u8>> {
    Content { operations }
        .encode()
        .map_err(|e| PdfMonoError::content_stream(e.to_string()))
}

/// 単独のオブジェクトをコンテンツストリームの構文で書き出す。
fn encode_object(object: Object) -> crate::error::Result<Vec<u8>> {
    // 空オペレータで包むと末尾に区切りの空白が1つ付く
    let mut bytes = encode_operations(vec![Operation::new("", vec![object])])?;
    if bytes.last() == Some(&b' ') {
        bytes.pop();
    }
    Ok(bytes)
}

/// `BI <key value ...> ID <data> EI`
///
/// Lengthはlopdfがパース時に付け足すキーなので書き出さない。
/// データは無加工のまま。
fn encode_inline_image(image: &Stream) -> crate::error::Result<Vec<u8>> {
    let mut out = b"BI".to_vec();
    for (key, value) in image.dict.iter() {
        if key.as_slice() == b"Length" {
            continue;
        }
        out.push(b' ');
        out.extend(encode_object(Object::Name(key.clone()))?);
        out.push(b' ');
        out.extend(encode_object(value.clone())?);
    }
    out.extend_from_slice(b" ID ");
    out.extend_from_slice(&image.content);
    out.extend_from_slice(b"\nEI");
    Ok(out)
}
