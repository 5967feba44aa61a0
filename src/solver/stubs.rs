//! No-op browser environment loaded before player-script statements so the
//! prologue code (document/navigator/localStorage touches) does not throw.

pub const BROWSER_STUBS: &str = r#"
var _dummyFunc = function(){ return _dummyProxy; };
var _dummyHandler = {
    get: function(t,p) {
        if (p === Symbol.toPrimitive || p === 'toString') return function(){return "";};
        if (p === 'length') return 0;
        return _dummyProxy;
    },
    set: function(){ return true; },
    apply: function(){ return _dummyProxy; },
    construct: function(){ return _dummyProxy; }
};
var _dummyProxy = new Proxy(_dummyFunc, _dummyHandler);

var _realDoc = {
    createElement: function() {
        return { innerHTML: '', style: {}, appendChild: function(){}, setAttribute: function(){} };
    },
    write: function() {},
    cookie: '',
    getElementById: function(){ return _dummyProxy; },
    getElementsByTagName: function(){ return []; },
    body: _dummyProxy,
    head: _dummyProxy,
    documentElement: { style: {} }
};
var document = new Proxy(_realDoc, {
    get: function(t,p) { if (p in t) return t[p]; return _dummyProxy; },
    set: function(t,p,v) { t[p] = v; return true; }
});

var _realWindow = {
    location: { hostname: 'www.youtube.com', protocol: 'https:', href: 'https://www.youtube.com/' },
    document: document,
    navigator: { userAgent: 'Mozilla/5.0' },
    Intl: {
        NumberFormat: function() {
            var f = function(n){ return "" + n; };
            return { format: f };
        },
        DateTimeFormat: function() { return { format: function(d){ return d.toString(); } }; }
    },
    history: { pushState: function(){}, replaceState: function(){} },
    screen: { width: 1280, height: 720 },
    localStorage: { getItem: function(){ return null; }, setItem: function(){} },
    sessionStorage: { getItem: function(){ return null; }, setItem: function(){} },
    Error: Error,
    TypeError: TypeError,
    XMLHttpRequest: function(){
        return {
            open: function(){},
            send: function(){},
            setRequestHeader: function(){},
            abort: function(){}
        };
    }
};
_realWindow.Intl.NumberFormat.supportedLocalesOf = function(){ return []; };

var window = new Proxy(_realWindow, {
    get: function(t,p) { if (p in t) return t[p]; return _dummyProxy; },
    set: function(t,p,v) { t[p] = v; return true; }
});

var location = window.location;
var navigator = window.navigator;
var localStorage = window.localStorage;
var sessionStorage = window.sessionStorage;
var history = window.history;
var screen = window.screen;
var Intl = window.Intl;

var g = window;
var _yt_player = window;

globalThis.window = window;
globalThis.document = document;
globalThis.location = window.location;
globalThis.navigator = window.navigator;
globalThis.XMLHttpRequest = _realWindow.XMLHttpRequest;
globalThis.Intl = window.Intl;
"#;
