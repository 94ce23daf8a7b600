//! 생성 카드와 글리프 렌더링.
//!
//! 연결 없음/연결 중/일시정지 카드를 `image` 버퍼로 직접 그린다.
//! 카드는 한 번만 렌더링되는 고정 이미지다 — 특히 일시정지 카드는
//! 호출 때마다 내용이 같아야 하므로 라이브 프레임을 어둡게 덮는 대신
//! 정적 카드를 쓴다. 텍스트는 내장 5×7 글리프로 그린다 (카드와
//! 타임스탬프에 필요한 문자만 수록).

use dolbom_core::models::frame::{Frame, FrameKind};
use image::{Rgb, RgbImage};
use once_cell::sync::Lazy;

/// 카드 해상도 (16:9)
pub const CARD_WIDTH: u32 = 853;
/// 카드 해상도 (16:9)
pub const CARD_HEIGHT: u32 = 480;

/// 카드 배경색
const CARD_BACKGROUND: Rgb<u8> = Rgb([12, 12, 16]);
/// 카드 본문색
const CARD_FOREGROUND: Rgb<u8> = Rgb([235, 235, 235]);

/// 글리프 한 칸 크기
const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;
/// 글리프 사이 간격 (스케일 적용 전)
const GLYPH_SPACING: u32 = 1;

/// 5×7 글리프 테이블 — 행당 하위 5비트 사용, MSB가 왼쪽.
/// 카드 문구와 타임스탬프(숫자, `:- ./`)에 필요한 문자만 수록한다.
const GLYPHS: &[(char, [u8; 7])] = &[
    ('0', [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110]),
    ('1', [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110]),
    ('2', [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111]),
    ('3', [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110]),
    ('4', [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010]),
    ('5', [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110]),
    ('6', [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110]),
    ('7', [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000]),
    ('8', [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110]),
    ('9', [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100]),
    ('A', [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001]),
    ('C', [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110]),
    ('D', [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110]),
    ('E', [0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b11111]),
    ('G', [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111]),
    ('I', [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110]),
    ('N', [0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001, 0b10001]),
    ('O', [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110]),
    ('P', [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000]),
    ('S', [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110]),
    ('T', [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100]),
    ('U', [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110]),
    ('V', [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100]),
    (':', [0b00000, 0b00100, 0b00100, 0b00000, 0b00100, 0b00100, 0b00000]),
    ('-', [0b00000, 0b00000, 0b00000, 0b01110, 0b00000, 0b00000, 0b00000]),
    ('.', [0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b00110, 0b00110]),
    ('/', [0b00001, 0b00010, 0b00100, 0b00100, 0b00100, 0b01000, 0b10000]),
    (' ', [0b00000; 7]),
];

/// 연결 없음 카드 (한 번만 렌더링)
static NO_CONNECTION: Lazy<Frame> = Lazy::new(|| render_card("NO CONNECTION"));

/// 연결 중 카드
static CONNECTING: Lazy<Frame> = Lazy::new(|| render_card("CONNECTING"));

/// 일시정지 카드 — 매 호출 내용이 동일해야 한다
static PAUSED: Lazy<Frame> = Lazy::new(|| render_card_with_kind("VIDEO PAUSED", FrameKind::Paused));

/// 연결 없음 카드 반환 (픽셀 공유 복제)
pub fn no_connection_card() -> Frame {
    NO_CONNECTION.clone()
}

/// 연결 중 카드 반환
pub fn connecting_card() -> Frame {
    CONNECTING.clone()
}

/// 일시정지 카드 반환
pub fn paused_card() -> Frame {
    PAUSED.clone()
}

fn render_card(title: &str) -> Frame {
    render_card_with_kind(title, FrameKind::Placeholder)
}

fn render_card_with_kind(title: &str, kind: FrameKind) -> Frame {
    let mut image = RgbImage::from_pixel(CARD_WIDTH, CARD_HEIGHT, CARD_BACKGROUND);

    let scale = 4;
    let width = text_width(title, scale);
    let x = CARD_WIDTH.saturating_sub(width) / 2;
    let y = (CARD_HEIGHT - GLYPH_HEIGHT * scale) / 2;
    draw_text(&mut image, title, x, y, scale, CARD_FOREGROUND);

    Frame::new_rgb8(CARD_WIDTH, CARD_HEIGHT, kind, image.into_raw())
        .expect("카드 버퍼 크기는 항상 해상도와 일치")
}

/// 텍스트 폭 계산 (픽셀)
pub fn text_width(text: &str, scale: u32) -> u32 {
    let glyphs = text.chars().count() as u32;
    if glyphs == 0 {
        return 0;
    }
    glyphs * (GLYPH_WIDTH + GLYPH_SPACING) * scale - GLYPH_SPACING * scale
}

/// 내장 글리프로 텍스트 그리기.
///
/// 테이블에 없는 문자는 공백으로 렌더링된다.
pub fn draw_text(image: &mut RgbImage, text: &str, x: u32, y: u32, scale: u32, color: Rgb<u8>) {
    let mut cursor_x = x;
    for ch in text.chars() {
        let rows = glyph_rows(ch);
        for (row_index, row) in rows.iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if row & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                    continue;
                }
                // 스케일만큼 픽셀 블록 채우기
                for dy in 0..scale {
                    for dx in 0..scale {
                        let px = cursor_x + col * scale + dx;
                        let py = y + row_index as u32 * scale + dy;
                        if px < image.width() && py < image.height() {
                            image.put_pixel(px, py, color);
                        }
                    }
                }
            }
        }
        cursor_x += (GLYPH_WIDTH + GLYPH_SPACING) * scale;
    }
}

/// 타임스탬프 번인 — 좌상단에 흰색으로.
pub fn burn_timestamp(image: &mut RgbImage, text: &str) {
    draw_text(image, text, 10, 10, 2, Rgb([255, 255, 255]));
}

fn glyph_rows(ch: char) -> [u8; 7] {
    let upper = ch.to_ascii_uppercase();
    GLYPHS
        .iter()
        .find(|(known, _)| *known == upper)
        .map(|(_, rows)| *rows)
        .unwrap_or([0u8; 7])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cards_have_expected_shape() {
        let card = no_connection_card();
        assert_eq!(card.width, CARD_WIDTH);
        assert_eq!(card.height, CARD_HEIGHT);
        assert_eq!(card.kind, FrameKind::Placeholder);
        assert!(!card.is_live());
    }

    #[test]
    fn paused_card_is_content_stable() {
        let first = paused_card();
        let second = paused_card();
        assert_eq!(first.kind, FrameKind::Paused);
        // 매 호출 같은 픽셀 버퍼
        assert!(std::sync::Arc::ptr_eq(&first.data, &second.data));
    }

    #[test]
    fn text_is_actually_drawn() {
        let mut image = RgbImage::from_pixel(100, 20, Rgb([0, 0, 0]));
        draw_text(&mut image, "0:1", 0, 0, 1, Rgb([255, 255, 255]));
        let lit = image.pixels().filter(|p| p.0 == [255, 255, 255]).count();
        assert!(lit > 0);
    }

    #[test]
    fn unknown_glyph_renders_blank() {
        let mut image = RgbImage::from_pixel(40, 10, Rgb([0, 0, 0]));
        draw_text(&mut image, "★", 0, 0, 1, Rgb([255, 255, 255]));
        let lit = image.pixels().filter(|p| p.0 == [255, 255, 255]).count();
        assert_eq!(lit, 0);
    }

    #[test]
    fn timestamp_charset_is_covered() {
        // 타임스탬프 포맷의 모든 문자가 테이블에 있어야 한다
        for ch in "0123456789-: ./".chars() {
            assert!(
                GLYPHS.iter().any(|(known, _)| *known == ch),
                "글리프 누락: {ch:?}"
            );
        }
    }
}
