// Phase 3: 色設定オペレータの書き換え（rg/RG, k/K → g/G）

use crate::color::luminance::{cmyk_to_gray, rgb_to_gray};
use crate::error::PdfMonoError;
use crate::pdf::content_stream::{Token, encode_tokens, tokenize};

/// オペレータ名から導出する色オペレータの分類。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorOperator {
    SetRgbFill,
    SetRgbStroke,
    SetCmykFill,
    SetCmykStroke,
    SetSeparationFill,
    SetSeparationStroke,
    Gray,
    Unrelated,
}

impl ColorOperator {
    pub fn classify(name: &str) -> Self {
        match name {
            "rg" => ColorOperator::SetRgbFill,
            "RG" => ColorOperator::SetRgbStroke,
            "k" => ColorOperator::SetCmykFill,
            "K" => ColorOperator::SetCmykStroke,
            "sc" | "scn" => ColorOperator::SetSeparationFill,
            "SC" | "SCN" => ColorOperator::SetSeparationStroke,
            "g" | "G" => ColorOperator::Gray,
            _ => ColorOperator::Unrelated,
        }
    }

    /// 消費する数値オペランドの数（書き換え対象のオペレータのみ）。
    pub fn arity(self) -> usize {
        match self {
            ColorOperator::SetRgbFill | ColorOperator::SetRgbStroke => 3,
            ColorOperator::SetCmykFill | ColorOperator::SetCmykStroke => 4,
            ColorOperator::SetSeparationFill
            | ColorOperator::SetSeparationStroke
            | ColorOperator::Gray => 1,
            ColorOperator::Unrelated => 0,
        }
    }

    /// 置き換え先のグレーオペレータ。塗り(小文字)/線(大文字)の区別を保つ。
    fn gray_operator(self) -> &'static str {
        match self {
            ColorOperator::SetRgbStroke
            | ColorOperator::SetCmykStroke
            | ColorOperator::SetSeparationStroke => "G",
            _ => "g",
        }
    }
}

/// 書き換え件数の集計。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RewriteStats {
    pub rgb_rewritten: usize,
    pub cmyk_rewritten: usize,
    /// インクなし(白)のため書き換えなかったCMYK指定
    pub cmyk_preserved: usize,
    pub tints_normalized: usize,
}

impl RewriteStats {
    pub fn rewritten(&self) -> usize {
        self.rgb_rewritten + self.cmyk_rewritten
    }

    pub fn merge(&mut self, other: &RewriteStats) {
        self.rgb_rewritten += other.rgb_rewritten;
        self.cmyk_rewritten += other.cmyk_rewritten;
        self.cmyk_preserved += other.cmyk_preserved;
        self.tints_normalized += other.tints_normalized;
    }
}

/// PDFのオペランドスタックを写した出力バッファ。
///
/// 出力トークン列そのものであり、末尾がスタックトップに相当する。
#[derive(Debug, Default)]
pub struct OperandStack {
    tokens: Vec<Token>,
}

impl OperandStack {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tokens: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, token: Token) {
        self.tokens.push(token);
    }

    /// 末尾に連続する数値トークンの個数。
    pub fn trailing_numbers(&self) -> usize {
        self.tokens
            .iter()
            .rev()
            .take_while(|t| matches!(t, Token::Number(_)))
            .count()
    }

    /// 末尾から `n` 個の数値を取り出し、元の並び順で返す。
    ///
    /// 末尾に数値が `n` 個連続していなければStructuralError。
    pub fn pop_numbers(&mut self, n: usize, operator: &str) -> crate::error::Result<Vec<f64>> {
        let available = self.trailing_numbers();
        if available < n {
            return Err(PdfMonoError::structural(format!(
                "operator '{operator}' needs {n} numeric operand(s), found {available}"
            )));
        }

        let split = self.tokens.len() - n;
        Ok(self
            .tokens
            .drain(split..)
            .filter_map(|t| t.as_number())
            .collect())
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn into_tokens(self) -> Vec<Token> {
        self.tokens
    }
}

/// トークン列中の色設定オペレータをグレー指定に書き換える。
///
/// 1パスで処理し、オペランドは出力バッファ（オペランドスタック）に積んでいく。
/// 色オペレータに必要な数値オペランドが足りない場合はStructuralError。
pub fn rewrite_tokens(tokens: &[Token]) -> crate::error::Result<(Vec<Token>, RewriteStats)> {
    let mut out = OperandStack::with_capacity(tokens.len());
    let mut stats = RewriteStats::default();

    for (i, token) in tokens.iter().enumerate() {
        let Token::Operator(name) = token else {
            out.push(token.clone());
            continue;
        };

        let class = ColorOperator::classify(name);
        match class {
            ColorOperator::SetRgbFill | ColorOperator::SetRgbStroke => {
                let rgb: Vec<f64> = out
                    .pop_numbers(class.arity(), name)?
                    .into_iter()
                    .map(unit)
                    .collect();
                let gray = rgb_to_gray(&rgb)?;
                out.push(Token::Number(gray));
                out.push(Token::operator(class.gray_operator()));
                stats.rgb_rewritten += 1;
            }
            ColorOperator::SetCmykFill | ColorOperator::SetCmykStroke => {
                // 元のトークン列を4つ遡ってc,m,y,kを取得する
                let cmyk = lookback_numbers(tokens, i, class.arity()).ok_or_else(|| {
                    PdfMonoError::structural(format!(
                        "operator '{name}' at token {i} is not preceded by 4 numeric operands"
                    ))
                })?;
                let cmyk: Vec<f64> = cmyk.into_iter().map(unit).collect();

                match cmyk_to_gray(&cmyk)? {
                    Some(gray) => {
                        out.pop_numbers(class.arity(), name)?;
                        out.push(Token::Number(gray));
                        out.push(Token::operator(class.gray_operator()));
                        stats.cmyk_rewritten += 1;
                    }
                    None => {
                        // インクなし: オペランドは出力済みなのでオペレータだけ通す
                        out.push(token.clone());
                        stats.cmyk_preserved += 1;
                    }
                }
            }
            ColorOperator::SetSeparationFill | ColorOperator::SetSeparationStroke
                if out.trailing_numbers() == 1 =>
            {
                // ティント値の正規化のみ。変換自体は色空間側で行う
                let tint = out.pop_numbers(1, name)?;
                out.push(Token::Number(unit(tint[0])));
                out.push(token.clone());
                stats.tints_normalized += 1;
            }
            _ => out.push(token.clone()),
        }
    }

    Ok((out.into_tokens(), stats))
}

/// コンテンツストリームのバイト列を書き換えて再エンコードする。
pub fn rewrite_content(content_bytes: &[u8]) -> crate::error::Result<(Vec<u8>, RewriteStats)> {
    let tokens = tokenize(content_bytes)?;
    let (rewritten, stats) = rewrite_tokens(&tokens)?;
    Ok((encode_tokens(rewritten)?, stats))
}

/// `tokens[index]` の直前 `n` 個がすべて数値ならその値を返す。
fn lookback_numbers(tokens: &[Token], index: usize, n: usize) -> Option<Vec<f64>> {
    if index < n {
        return None;
    }
    tokens[index - n..index]
        .iter()
        .map(Token::as_number)
        .collect()
}

fn unit(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}
