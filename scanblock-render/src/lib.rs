mod render;

pub use ab_glyph::FontVec;
pub use render::{
    BACKGROUND, BlockRenderer, FINISH_BACKGROUND, load_font, load_system_font, render_text_pixmap,
};
