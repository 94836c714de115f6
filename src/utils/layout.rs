//! 浮动面板定位：由锚点几何信息和视口尺寸计算面板偏移，视口变化时重新计算

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub top: f64,
    pub right: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub scroll_y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanelPosition {
    pub top: f64,
    pub right: f64,
}

/// 面板紧贴锚点下方，并与锚点右边缘对齐
pub fn panel_position(anchor: Rect, viewport: Viewport) -> PanelPosition {
    PanelPosition {
        top: anchor.top + anchor.height + viewport.scroll_y,
        right: (viewport.width - anchor.right).max(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panel_sits_below_anchor() {
        let anchor = Rect { top: 10.0, right: 1180.0, width: 40.0, height: 40.0 };
        let viewport = Viewport { width: 1200.0, height: 800.0, scroll_y: 0.0 };
        assert_eq!(panel_position(anchor, viewport), PanelPosition { top: 50.0, right: 20.0 });
    }

    #[test]
    fn test_panel_follows_scroll_and_resize() {
        let anchor = Rect { top: 10.0, right: 980.0, width: 40.0, height: 40.0 };
        let scrolled = Viewport { width: 1000.0, height: 800.0, scroll_y: 300.0 };
        assert_eq!(panel_position(anchor, scrolled), PanelPosition { top: 350.0, right: 20.0 });

        let narrow = Viewport { width: 900.0, height: 800.0, scroll_y: 0.0 };
        assert_eq!(panel_position(anchor, narrow).right, 0.0);
    }
}
