//! Win32 backend: PrintWindow into a DIB for background capture and
//! PostMessage for key delivery, neither of which touches focus or z-order.

use std::ffi::c_void;
use std::mem;

use image::{DynamicImage, RgbaImage};
use windows_sys::Win32::Foundation::{BOOL, FALSE, HWND, LPARAM, RECT, TRUE};
use windows_sys::Win32::Graphics::Gdi::{
    CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject, GetDC, GetDIBits,
    ReleaseDC, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS,
};
use windows_sys::Win32::Storage::Xps::{PrintWindow, PW_CLIENTONLY};
use windows_sys::Win32::UI::Input::KeyboardAndMouse::VK_RIGHT;
use windows_sys::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetClientRect, GetWindowTextLengthW, GetWindowTextW, IsWindow,
    IsWindowVisible, PostMessageW, SetProcessDPIAware, WM_KEYDOWN, WM_KEYUP,
};

use super::{WindowError, WindowHandle};

fn to_hwnd(handle: WindowHandle) -> HWND {
    handle.0 as usize as HWND
}

fn to_handle(hwnd: HWND) -> WindowHandle {
    WindowHandle(hwnd as usize as u64)
}

/// Capture coordinates are wrong on scaled displays unless the process opts in.
pub fn declare_dpi_aware() {
    unsafe {
        SetProcessDPIAware();
    }
}

fn window_title(hwnd: HWND) -> String {
    unsafe {
        let len = GetWindowTextLengthW(hwnd);
        if len <= 0 {
            return String::new();
        }
        let mut buf = vec![0u16; len as usize + 1];
        let copied = GetWindowTextW(hwnd, buf.as_mut_ptr(), buf.len() as i32);
        String::from_utf16_lossy(&buf[..copied.max(0) as usize])
    }
}

struct TitleSearch {
    needle: String,
    found: Option<HWND>,
}

unsafe extern "system" fn enum_proc(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let search = &mut *(lparam as *mut TitleSearch);
    if IsWindowVisible(hwnd) == 0 {
        return TRUE;
    }
    if window_title(hwnd).contains(&search.needle) {
        search.found = Some(hwnd);
        return FALSE;
    }
    TRUE
}

pub fn find_window(title: &str) -> Option<WindowHandle> {
    let mut search = TitleSearch {
        needle: title.to_string(),
        found: None,
    };
    unsafe {
        // Returns FALSE when the callback stops early, which is the success case here
        EnumWindows(Some(enum_proc), &mut search as *mut TitleSearch as LPARAM);
    }
    search.found.map(to_handle)
}

pub fn capture_client(handle: WindowHandle) -> Result<DynamicImage, WindowError> {
    let hwnd = to_hwnd(handle);

    unsafe {
        if IsWindow(hwnd) == 0 {
            return Err(WindowError::Gone(handle));
        }

        let mut rect: RECT = mem::zeroed();
        if GetClientRect(hwnd, &mut rect) == 0 {
            return Err(WindowError::Gone(handle));
        }
        let width = rect.right - rect.left;
        let height = rect.bottom - rect.top;
        if width <= 0 || height <= 0 {
            return Err(WindowError::Capture(format!(
                "Client area is {width}x{height} (minimized?)"
            )));
        }

        let window_dc = GetDC(hwnd);
        if window_dc.is_null() {
            return Err(WindowError::Capture("GetDC failed".into()));
        }
        let mem_dc = CreateCompatibleDC(window_dc);
        let bitmap = CreateCompatibleBitmap(window_dc, width, height);
        let previous = SelectObject(mem_dc, bitmap);

        let printed = PrintWindow(hwnd, mem_dc, PW_CLIENTONLY);

        let mut info: BITMAPINFO = mem::zeroed();
        info.bmiHeader = BITMAPINFOHEADER {
            biSize: mem::size_of::<BITMAPINFOHEADER>() as u32,
            biWidth: width,
            // Negative height requests top-down rows
            biHeight: -height,
            biPlanes: 1,
            biBitCount: 32,
            biCompression: BI_RGB,
            ..mem::zeroed()
        };

        let mut pixels = vec![0u8; width as usize * height as usize * 4];
        let lines = GetDIBits(
            mem_dc,
            bitmap,
            0,
            height as u32,
            pixels.as_mut_ptr() as *mut c_void,
            &mut info,
            DIB_RGB_COLORS,
        );

        SelectObject(mem_dc, previous);
        DeleteObject(bitmap);
        DeleteDC(mem_dc);
        ReleaseDC(hwnd, window_dc);

        if printed == 0 {
            return Err(WindowError::Capture("PrintWindow failed".into()));
        }
        if lines == 0 {
            return Err(WindowError::Capture("GetDIBits failed".into()));
        }

        // BGRX → RGBA
        for px in pixels.chunks_exact_mut(4) {
            px.swap(0, 2);
            px[3] = 255;
        }

        RgbaImage::from_raw(width as u32, height as u32, pixels)
            .map(DynamicImage::ImageRgba8)
            .ok_or_else(|| WindowError::Capture("Bitmap size mismatch".into()))
    }
}

pub fn post_forward_key(handle: WindowHandle) -> Result<(), String> {
    let hwnd = to_hwnd(handle);
    unsafe {
        if PostMessageW(hwnd, WM_KEYDOWN, VK_RIGHT as usize, 0) == 0 {
            return Err(format!("PostMessage(WM_KEYDOWN) to {handle} failed"));
        }
        if PostMessageW(hwnd, WM_KEYUP, VK_RIGHT as usize, 0) == 0 {
            return Err(format!("PostMessage(WM_KEYUP) to {handle} failed"));
        }
    }
    Ok(())
}
