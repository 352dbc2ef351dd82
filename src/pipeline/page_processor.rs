// Phase 10: ページ単位処理: 色オペレータ → 画像 → Separation色空間

use std::collections::{HashMap, HashSet};

use lopdf::{Document, Object, ObjectId, Stream};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::pdf::color_rewriter::{RewriteStats, rewrite_content};
use crate::pdf::image_xobject::{ImageMeta, ImageOptions, convert_image_stream, read_image_meta};
use crate::pdf::resources::{
    collect_page_images, for_each_xobject, reachable_resource_sets, set_entry, subtype_is,
};
use crate::pdf::reader::{page_content, stream_content};
use crate::pdf::separation;
use crate::pdf::writer::set_page_content;

/// 書き換え対象のコンテンツストリーム
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentTarget {
    Page(ObjectId),
    Form(ObjectId),
}

/// 書き換え前のコンテンツ（読み取りフェーズで集める）
#[derive(Debug)]
pub struct ContentJob {
    pub page: u32,
    pub target: ContentTarget,
    pub bytes: Vec<u8>,
}

/// 書き換え後のコンテンツ
#[derive(Debug)]
pub struct ColorRewrite {
    pub target: ContentTarget,
    pub bytes: Vec<u8>,
    pub stats: RewriteStats,
}

impl ColorRewrite {
    fn changed(&self) -> bool {
        self.stats.rewritten() > 0 || self.stats.tints_normalized > 0
    }
}

/// 画像変換の集計
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImageStats {
    pub converted: usize,
    /// 既にグレー、またはステンシルマスクで変換不要だった画像
    pub unchanged: usize,
    /// デコードに失敗してスキップした画像
    pub failed: usize,
}

impl ImageStats {
    pub fn merge(&mut self, other: &ImageStats) {
        self.converted += other.converted;
        self.unchanged += other.unchanged;
        self.failed += other.failed;
    }
}

/// ページ本体と、そこから到達可能なForm XObjectのコンテンツを集める。
pub fn collect_color_targets(
    doc: &Document,
    page: u32,
    page_id: ObjectId,
) -> crate::error::Result<Vec<ContentJob>> {
    let mut jobs = vec![ContentJob {
        page,
        target: ContentTarget::Page(page_id),
        bytes: page_content(doc, page_id)?,
    }];

    let mut seen = HashSet::new();
    for set in reachable_resource_sets(doc, page_id) {
        let mut forms = Vec::new();
        for_each_xobject(doc, &set.path, |_, id, stream| {
            if subtype_is(&stream.dict, b"Form") && seen.insert(id) {
                forms.push((id, stream));
            }
        });
        for (id, stream) in forms {
            jobs.push(ContentJob {
                page,
                target: ContentTarget::Form(id),
                bytes: stream_content(stream)?,
            });
        }
    }

    Ok(jobs)
}

/// コンテンツを書き換える。ドキュメントに触れないので並列に実行できる。
pub fn rewrite_content_job(job: ContentJob) -> crate::error::Result<ColorRewrite> {
    let (bytes, stats) = rewrite_content(&job.bytes)?;
    Ok(ColorRewrite {
        target: job.target,
        bytes,
        stats,
    })
}

/// 書き換え結果をドキュメントに書き戻す。
///
/// `applied` に記録済みの対象（複数ページで共有されたFormなど）は二重に
/// 書き戻さず、集計にも含めない。
pub fn apply_color_rewrites(
    doc: &mut Document,
    rewrites: Vec<ColorRewrite>,
    applied: &mut HashSet<ContentTarget>,
) -> crate::error::Result<RewriteStats> {
    let mut stats = RewriteStats::default();
    for rewrite in rewrites {
        if !applied.insert(rewrite.target) {
            continue;
        }
        stats.merge(&rewrite.stats);
        if !rewrite.changed() {
            continue;
        }
        match rewrite.target {
            ContentTarget::Page(page_id) => {
                set_page_content(doc, page_id, rewrite.bytes)?;
            }
            ContentTarget::Form(form_id) => {
                let stream = doc.get_object_mut(form_id).and_then(Object::as_stream_mut)?;
                stream.set_plain_content(rewrite.bytes);
            }
        }
    }
    Ok(stats)
}

/// ページ（と入れ子のForm XObject）の色設定オペレータをグレーに書き換える。
pub fn rewrite_page_colors(doc: &mut Document, page_id: ObjectId) -> crate::error::Result<RewriteStats> {
    let jobs = collect_color_targets(doc, 0, page_id)?;
    let rewrites = jobs
        .into_iter()
        .map(rewrite_content_job)
        .collect::<crate::error::Result<Vec<_>>>()?;
    apply_color_rewrites(doc, rewrites, &mut HashSet::new())
}

/// ページから到達可能な画像をグレーに変換する。
///
/// 画像ごとの失敗は警告してスキップし、ページ全体は失敗させない。
pub fn convert_page_images_to_gray(
    doc: &mut Document,
    page_id: ObjectId,
    options: &ImageOptions,
) -> crate::error::Result<ImageStats> {
    convert_page_images_with_cache(doc, page_id, options, &mut HashMap::new())
}

/// `converted` は (元の画像ID → 変換後の画像ID)。ページをまたいで共有
/// された画像を一度だけ変換するため、呼び出し側が保持する。
pub fn convert_page_images_with_cache(
    doc: &mut Document,
    page_id: ObjectId,
    options: &ImageOptions,
    converted: &mut HashMap<ObjectId, ObjectId>,
) -> crate::error::Result<ImageStats> {
    let refs = collect_page_images(doc, page_id);
    let mut stats = ImageStats::default();

    // Phase A: 未変換の画像を集める（順序を保って重複除去）
    let mut seen = HashSet::new();
    let mut pending: Vec<(ObjectId, &Stream, ImageMeta)> = Vec::new();
    for image in &refs {
        if converted.contains_key(&image.image_id) || !seen.insert(image.image_id) {
            continue;
        }
        let Ok(Object::Stream(stream)) = doc.get_object(image.image_id) else {
            continue;
        };
        match read_image_meta(doc, stream) {
            Ok(meta) => pending.push((image.image_id, stream, meta)),
            Err(e) => {
                warn!(image = ?image.image_id, error = %e, "skipping image with unreadable dictionary");
                stats.failed += 1;
            }
        }
    }

    // Phase B: 変換（画像単位で並列、画像内は行単位で並列）
    let results: Vec<(ObjectId, crate::error::Result<Option<Stream>>)> = pending
        .par_iter()
        .map(|(id, stream, meta)| (*id, convert_image_stream(stream, meta, options)))
        .collect();

    // Phase C: 新しい画像オブジェクトを追加（逐次）
    for (id, result) in results {
        match result {
            Ok(Some(stream)) => {
                let new_id = doc.add_object(stream);
                debug!(image = ?id, new = ?new_id, "image converted to gray");
                converted.insert(id, new_id);
                stats.converted += 1;
            }
            Ok(None) => stats.unchanged += 1,
            Err(e) => {
                warn!(image = ?id, error = %e, "image conversion skipped");
                stats.failed += 1;
            }
        }
    }

    // Phase D: 参照を差し替える
    for image in refs {
        if let Some(&new_id) = converted.get(&image.image_id) {
            set_entry(doc, &image.xobjects, &image.name, Object::Reference(new_id))?;
        }
    }

    Ok(stats)
}

/// ページ（と入れ子のForm XObject）のSeparation色空間を書き換える。
pub fn rewrite_separation_colorspaces(
    doc: &mut Document,
    page_id: ObjectId,
) -> crate::error::Result<usize> {
    separation::rewrite_separation_colorspaces(doc, page_id)
}

/// ページのリソース側の処理（画像、Separation）のオプション
#[derive(Debug, Clone, Copy)]
pub struct ResourceOptions {
    pub convert_images: bool,
    pub rewrite_separations: bool,
    pub image: ImageOptions,
}

/// ページのリソース側の処理結果
#[derive(Debug, Default, Clone, Copy)]
pub struct ResourceOutcome {
    pub images: ImageStats,
    pub separations: usize,
}

/// 画像変換とSeparation書き換えを順に行う。
///
/// 失敗した場合はページ番号と段階名を付けたエラーを返す。
pub fn process_page_resources(
    doc: &mut Document,
    page: u32,
    page_id: ObjectId,
    options: &ResourceOptions,
    image_cache: &mut HashMap<ObjectId, ObjectId>,
) -> crate::error::Result<ResourceOutcome> {
    let mut outcome = ResourceOutcome::default();

    if options.convert_images {
        outcome.images = convert_page_images_with_cache(doc, page_id, &options.image, image_cache)
            .map_err(|e| e.at_page(page, "images"))?;
    }
    if options.rewrite_separations {
        outcome.separations =
            rewrite_separation_colorspaces(doc, page_id).map_err(|e| e.at_page(page, "separations"))?;
    }

    debug!(
        page,
        images_converted = outcome.images.converted,
        images_failed = outcome.images.failed,
        separations = outcome.separations,
        "page resources processed"
    );
    Ok(outcome)
}
